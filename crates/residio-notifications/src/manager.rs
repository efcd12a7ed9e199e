use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::{self, row_to_notification, SELECT_COLUMNS};
use crate::error::{NotificationError, Result};
use crate::types::{NewNotification, Notification, NotificationKind};

/// Thread-safe manager for resident notifications.
///
/// Backs the portal's notification bell: listing, unread counts and marking
/// as read. The debt scan does not go through this type; it writes with
/// [`db::insert`] on its own scan-scoped connection.
pub struct NotificationManager {
    db: Mutex<Connection>,
}

impl NotificationManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self, new), fields(user_id = %new.user_id, kind = %new.kind))]
    pub fn create(&self, new: NewNotification) -> Result<Notification> {
        let n = db::insert(&self.conn(), new)?;
        debug!(notification_id = %n.id, "notification created");
        Ok(n)
    }

    #[instrument(skip(self))]
    pub fn exists(&self, kind: NotificationKind, related_entity_id: &str) -> Result<bool> {
        db::exists_for(&self.conn(), kind, related_entity_id)
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Notification> {
        match self.conn().query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM notifications WHERE id = ?1"),
            [id],
            row_to_notification,
        ) {
            Ok(n) => Ok(n),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(NotificationError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first. `unread_only` hides notifications already read.
    #[instrument(skip(self))]
    pub fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![user_id, unread_only, limit as i64],
            row_to_notification,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    pub fn mark_read(&self, id: &str) -> Result<()> {
        let n = self
            .conn()
            .execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(NotificationError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Returns how many notifications flipped to read.
    #[instrument(skip(self))]
    pub fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id],
        )?;
        Ok(n)
    }

    #[instrument(skip(self))]
    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NotificationManager {
        let conn = Connection::open_in_memory().expect("open failed");
        db::init_db(&conn).expect("init failed");
        NotificationManager::new(conn)
    }

    fn debt(user: &str, bill: &str) -> NewNotification {
        NewNotification {
            user_id: user.to_string(),
            kind: NotificationKind::Debt,
            title: "Payment overdue".to_string(),
            body: "body".to_string(),
            related_entity_id: Some(bill.to_string()),
        }
    }

    #[test]
    fn created_notification_is_unread() {
        let m = manager();
        let n = m.create(debt("u-1", "b-1")).unwrap();
        assert!(!n.is_read);
        let loaded = m.get(&n.id).unwrap();
        assert_eq!(loaded.kind, NotificationKind::Debt);
        assert_eq!(loaded.related_entity_id.as_deref(), Some("b-1"));
    }

    #[test]
    fn exists_matches_kind_and_entity() {
        let m = manager();
        m.create(debt("u-1", "b-1")).unwrap();
        assert!(m.exists(NotificationKind::Debt, "b-1").unwrap());
        assert!(!m.exists(NotificationKind::Debt, "b-2").unwrap());
        assert!(!m.exists(NotificationKind::Payment, "b-1").unwrap());
    }

    #[test]
    fn read_tracking() {
        let m = manager();
        let a = m.create(debt("u-1", "b-1")).unwrap();
        m.create(debt("u-1", "b-2")).unwrap();
        m.create(debt("u-2", "b-3")).unwrap();
        assert_eq!(m.unread_count("u-1").unwrap(), 2);

        m.mark_read(&a.id).unwrap();
        assert_eq!(m.unread_count("u-1").unwrap(), 1);
        assert_eq!(m.list_for_user("u-1", true, 10).unwrap().len(), 1);
        assert_eq!(m.list_for_user("u-1", false, 10).unwrap().len(), 2);

        assert_eq!(m.mark_all_read("u-1").unwrap(), 1);
        assert_eq!(m.unread_count("u-1").unwrap(), 0);
        assert_eq!(m.unread_count("u-2").unwrap(), 1);
    }

    #[test]
    fn list_respects_limit() {
        let m = manager();
        for i in 0..5 {
            m.create(debt("u-1", &format!("b-{i}"))).unwrap();
        }
        assert_eq!(m.list_for_user("u-1", false, 3).unwrap().len(), 3);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let m = manager();
        assert!(matches!(m.mark_read("missing"), Err(NotificationError::NotFound { .. })));
        assert!(matches!(m.get("missing"), Err(NotificationError::NotFound { .. })));
    }
}
