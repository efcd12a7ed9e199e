pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{NotificationError, Result};
pub use manager::NotificationManager;
pub use types::{NewNotification, Notification, NotificationKind};
