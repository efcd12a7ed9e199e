use residio_billing::BillingError;
use residio_notifications::NotificationError;
use thiserror::Error;

/// Errors that can end a single debt scan. None of them stop the loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Opening or configuring the scan connection failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Billing query failed: {0}")]
    Billing(#[from] BillingError),

    #[error("Notification write failed: {0}")]
    Notification(#[from] NotificationError),

    /// The blocking scan task panicked or was aborted.
    #[error("Scan task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
