//! `residio-scheduler`: daily debt notification scan.
//!
//! # Overview
//!
//! [`engine::SchedulerEngine`] runs for the lifetime of the host process.
//! Each cycle it asks [`debt::DebtScanner`] to find bills older than the
//! grace period that are still unpaid, and creates one `Debt` notification
//! per such bill for the account owner. Between cycles it sleeps for a fixed
//! interval; a [`tokio_util::sync::CancellationToken`] ends the loop from
//! either state.
//!
//! | State      | Leaves when                                        |
//! |------------|----------------------------------------------------|
//! | `Scanning` | scan returns (success or logged failure)           |
//! | `Sleeping` | interval elapses, or the token is cancelled        |
//!
//! The database connection is opened per scan through a [`store::StoreFactory`]
//! and dropped when the scan ends; nothing is held across the sleep.

pub mod clock;
pub mod debt;
pub mod engine;
pub mod error;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use debt::{overdue_threshold, DebtScanner, ScanReport};
pub use engine::{LoopState, SchedulerEngine, SchedulerStatus};
pub use error::{Result, SchedulerError};
pub use store::{DebtStore, SqliteStoreFactory, StoreFactory};
