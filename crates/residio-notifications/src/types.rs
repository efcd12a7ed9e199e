use serde::{Deserialize, Serialize};

/// What produced the notification. The debt scan only ever emits `Debt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Debt,
    Announcement,
    RequestStatus,
    Payment,
    MeterReading,
    System,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debt => write!(f, "debt"),
            Self::Announcement => write!(f, "announcement"),
            Self::RequestStatus => write!(f, "request_status"),
            Self::Payment => write!(f, "payment"),
            Self::MeterReading => write!(f, "meter_reading"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debt" => Ok(Self::Debt),
            "announcement" => Ok(Self::Announcement),
            "request_status" => Ok(Self::RequestStatus),
            "payment" => Ok(Self::Payment),
            "meter_reading" => Ok(Self::MeterReading),
            "system" => Ok(Self::System),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// A user-facing message, persisted until the resident reads (or ignores) it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    pub is_read: bool,
    /// Identifier of the entity that caused this notification (a bill id for
    /// debt notices).
    pub related_entity_id: Option<String>,
}

/// Input for creating a notification. `created_at` and `is_read` are set by
/// the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_entity_id: Option<String>,
}
