//! `residio-billing`: accounts, bills and payments backed by SQLite.
//!
//! The portal's billing and payment services own these rows; this crate
//! provides the schema, a small store for writing them, and the read query
//! the debt scan depends on ([`db::bills_before`]).

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{BillingError, Result};
pub use store::BillingStore;
pub use types::{Account, Bill, BillBatch, BillWithPayments, Payment, PaymentStatus};
