use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use residio_core::config::{ensure_parent_dir, ResidioConfig};
use residio_scheduler::{Clock, FixedClock, SchedulerEngine, SqliteStoreFactory, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "residio-gateway", version, about = "Residio background services host")]
struct Cli {
    /// Config file path (overrides RESIDIO_CONFIG and ~/.residio/residio.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the debt scheduler and the health endpoint until Ctrl-C (default).
    Serve,
    /// Run one debt scan and print its report as JSON.
    Scan {
        /// Scan as of this instant (RFC 3339) instead of now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "residio_gateway=info,residio_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > RESIDIO_CONFIG env > ~/.residio/residio.toml
    let config_path = cli.config.or_else(|| std::env::var("RESIDIO_CONFIG").ok());
    let config = ResidioConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        ResidioConfig::default()
    });

    open_database(&config.database.path)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Scan { at } => scan(config, at).await,
    }
}

/// Create the database file if needed and run all schema migrations
/// (idempotent). The connection is closed again; every subsystem opens its own.
fn open_database(db_path: &str) -> anyhow::Result<()> {
    ensure_parent_dir(db_path)?;
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    residio_billing::db::init_db(&db)?;
    residio_notifications::db::init_db(&db)?;
    info!("database migrations complete");
    Ok(())
}

async fn serve(config: ResidioConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // spawn the debt scheduler loop in background; it opens a connection per scan
    let (status, scheduler_task) = if config.scheduler.enabled {
        let engine = SchedulerEngine::new(
            SqliteStoreFactory::new(config.database.path.clone()),
            Arc::new(SystemClock),
        );
        let status = engine.status();
        let task = tokio::spawn(engine.run(cancel.clone()));
        (Some(status), Some(task))
    } else {
        warn!("debt scheduler disabled by config");
        (None, None)
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, status));
    let router = app::build_router(state);

    info!("Residio gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // stop the scheduler and wait for its current bill to finish
    cancel.cancel();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            warn!("scheduler task ended abnormally: {e}");
        }
    }
    info!("Residio gateway stopped");
    Ok(())
}

async fn scan(config: ResidioConfig, at: Option<DateTime<Utc>>) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = match at {
        Some(at) => Arc::new(FixedClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let engine = SchedulerEngine::new(SqliteStoreFactory::new(config.database.path), clock);
    let report = engine.scan_once(&CancellationToken::new()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Resolve on Ctrl-C (or SIGTERM on unix) and cancel `cancel`.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    cancel.cancel();
}
