use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Debt scan constants (not configurable)
pub const DEBT_GRACE_DAYS: i64 = 30; // bills older than this (strictly) are overdue
pub const DEBT_SCAN_INTERVAL_SECS: u64 = 24 * 60 * 60; // one scan per day

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (residio.toml + RESIDIO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResidioConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Debt notification scheduler switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the daily debt scan in this process (default: true).
    /// Override with env var: RESIDIO_SCHEDULER_ENABLED=false
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.residio/residio.db", home)
}

impl ResidioConfig {
    /// Load config from a TOML file with RESIDIO_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.residio/residio.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ResidioError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RESIDIO_").split("_"))
    }
}

/// Ensure the parent directory for the database file exists.
pub fn ensure_parent_dir(path: &str) -> crate::error::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::debug!(dir = %parent.display(), "created database directory");
        }
    }
    Ok(())
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.residio/residio.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ResidioConfig::load(Some("/nonexistent/residio.toml")).expect("load failed");
        assert!(config.scheduler.enabled);
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert!(config.database.path.ends_with("residio.db"));
    }

    #[test]
    fn toml_sections_are_read() {
        let toml = r#"
            [database]
            path = "/var/lib/residio/portal.db"

            [scheduler]
            enabled = false
        "#;
        let config: ResidioConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("extract failed");
        assert_eq!(config.database.path, "/var/lib/residio/portal.db");
        assert!(!config.scheduler.enabled);
        assert_eq!(config.gateway.bind, DEFAULT_BIND);
    }
}
