use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResidioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResidioError {
    /// Short error code string for structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ResidioError::Config(_) => "CONFIG_ERROR",
            ResidioError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResidioError>;
