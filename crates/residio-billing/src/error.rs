use thiserror::Error;

/// Errors that can occur within the billing subsystem.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("account not found: {id}")]
    AccountNotFound { id: String },

    #[error("bill not found: {id}")]
    BillNotFound { id: String },

    #[error("payment not found: {id}")]
    PaymentNotFound { id: String },

    /// Negative bill totals and non-positive payments are rejected.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

pub type Result<T> = std::result::Result<T, BillingError>;
