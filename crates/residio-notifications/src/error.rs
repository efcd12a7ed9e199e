use thiserror::Error;

/// Errors that can occur during notification operations.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested notification does not exist.
    #[error("notification not found: {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, NotificationError>;
