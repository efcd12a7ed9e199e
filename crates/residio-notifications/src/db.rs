use std::str::FromStr;

use chrono::Utc;
use rusqlite::{types::Type, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{NewNotification, Notification, NotificationKind};

pub(crate) const SELECT_COLUMNS: &str =
    "id, user_id, kind, title, body, created_at, is_read, related_entity_id";

/// Initialise the notifications table and its indexes.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notifications (
            id                 TEXT PRIMARY KEY NOT NULL,
            user_id            TEXT NOT NULL,
            kind               TEXT NOT NULL,
            title              TEXT NOT NULL,
            body               TEXT NOT NULL,
            created_at         TEXT NOT NULL,
            is_read            INTEGER NOT NULL DEFAULT 0,
            related_entity_id  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications (user_id, created_at DESC);
        -- existence check on every scanned bill: WHERE kind = ? AND related_entity_id = ?
        CREATE INDEX IF NOT EXISTS idx_notifications_related
            ON notifications (kind, related_entity_id);",
    )?;
    Ok(())
}

/// True if a notification of `kind` already points at `related_entity_id`.
pub fn exists_for(conn: &Connection, kind: NotificationKind, related_entity_id: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT EXISTS(
             SELECT 1 FROM notifications WHERE kind = ?1 AND related_entity_id = ?2
         )",
    )?;
    let found = stmt.query_row(rusqlite::params![kind.to_string(), related_entity_id], |row| {
        row.get::<_, bool>(0)
    })?;
    Ok(found)
}

/// Persist a new unread notification stamped with the current time.
pub fn insert(conn: &Connection, new: NewNotification) -> Result<Notification> {
    let id = Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO notifications
         (id, user_id, kind, title, body, created_at, is_read, related_entity_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        rusqlite::params![
            id,
            new.user_id,
            new.kind.to_string(),
            new.title,
            new.body,
            now,
            new.related_entity_id
        ],
    )?;
    Ok(Notification {
        id,
        user_id: new.user_id,
        kind: new.kind,
        title: new.title,
        body: new.body,
        created_at: now,
        is_read: false,
        related_entity_id: new.related_entity_id,
    })
}

/// Map a SELECT row (column order from `SELECT_COLUMNS`) to a Notification.
pub(crate) fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    let kind = NotificationKind::from_str(&kind)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        title: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
        related_entity_id: row.get(7)?,
    })
}
