use std::time::Duration;

use chrono::NaiveDate;
use residio_billing::BillBatch;
use residio_notifications::{NewNotification, Notification, NotificationKind};
use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// How long a scan write waits on a locked database before failing the scan.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The persistence contracts a debt scan consumes.
pub trait DebtStore {
    /// Bills with period strictly before `before`, with account and payments.
    /// Undecodable bills come back in `BillBatch::invalid`.
    fn bills_before(&self, before: NaiveDate) -> Result<BillBatch>;

    /// True if a `Debt` notification already references `bill_id`.
    fn debt_notice_exists(&self, bill_id: &str) -> Result<bool>;

    /// Persist an unread notification stamped with the current time.
    fn create_notification(&self, new: NewNotification) -> Result<Notification>;
}

/// Acquires a [`DebtStore`] for the duration of one scan.
///
/// The returned store is dropped when the scan returns, on success and error
/// paths alike, which releases whatever it holds.
pub trait StoreFactory: Send + Sync + 'static {
    type Store: DebtStore;

    fn open(&self) -> Result<Self::Store>;
}

/// Opens a fresh SQLite connection per scan.
///
/// `path` may be a plain file path or a SQLite URI (`file:...`).
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    path: String,
}

impl SqliteStoreFactory {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreFactory for SqliteStoreFactory {
    type Store = SqliteDebtStore;

    fn open(&self) -> Result<SqliteDebtStore> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = %self.path, "scan connection opened");
        Ok(SqliteDebtStore { conn })
    }
}

/// Scan-scoped store over one SQLite connection.
pub struct SqliteDebtStore {
    conn: Connection,
}

impl DebtStore for SqliteDebtStore {
    fn bills_before(&self, before: NaiveDate) -> Result<BillBatch> {
        Ok(residio_billing::db::bills_before(&self.conn, before)?)
    }

    fn debt_notice_exists(&self, bill_id: &str) -> Result<bool> {
        Ok(residio_notifications::db::exists_for(
            &self.conn,
            NotificationKind::Debt,
            bill_id,
        )?)
    }

    fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        Ok(residio_notifications::db::insert(&self.conn, new)?)
    }
}

impl Drop for SqliteDebtStore {
    fn drop(&mut self) {
        debug!("scan connection released");
    }
}

/// In-memory store for loop tests: counts acquisitions and releases, and can
/// be told to fail upcoming bill queries.
#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use residio_billing::{Account, Bill, BillWithPayments};
    use rust_decimal::Decimal;
    use tokio_util::sync::CancellationToken;

    use super::*;

    /// Unpaid 500.00 bill for August 2026 on an account owned by `owner`.
    pub(crate) fn overdue_bill(id: &str, owner: Option<&str>) -> BillWithPayments {
        BillWithPayments {
            bill: Bill {
                id: id.to_string(),
                account_id: format!("a-{id}"),
                period: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                total_amount: Decimal::from(500),
                created_at: String::new(),
            },
            account: Some(Account {
                id: format!("a-{id}"),
                number: format!("N-{id}"),
                owner_user_id: owner.map(String::from),
                created_at: String::new(),
            }),
            payments: Vec::new(),
        }
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        pub bills: Mutex<Vec<BillWithPayments>>,
        pub created: Mutex<Vec<NewNotification>>,
        /// Number of upcoming `bills_before` calls that return an error.
        pub failing_queries: AtomicUsize,
        pub queries: AtomicUsize,
        pub opened: AtomicUsize,
        pub released: AtomicUsize,
        /// Cancelled by the next `create_notification` call, once.
        pub cancel_on_create: Mutex<Option<CancellationToken>>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockFactory(pub Arc<MockState>);

    pub(crate) struct MockStore(Arc<MockState>);

    impl StoreFactory for MockFactory {
        type Store = MockStore;

        fn open(&self) -> Result<MockStore> {
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockStore(Arc::clone(&self.0)))
        }
    }

    impl Drop for MockStore {
        fn drop(&mut self) {
            self.0.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl DebtStore for MockStore {
        fn bills_before(&self, before: NaiveDate) -> Result<BillBatch> {
            self.0.queries.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .0
                .failing_queries
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some("database is locked".to_string()),
                )
                .into());
            }
            let bills = self
                .0
                .bills
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.bill.period < before)
                .cloned()
                .collect();
            Ok(BillBatch {
                bills,
                invalid: Vec::new(),
            })
        }

        fn debt_notice_exists(&self, bill_id: &str) -> Result<bool> {
            Ok(self.0.created.lock().unwrap().iter().any(|n| {
                n.kind == NotificationKind::Debt && n.related_entity_id.as_deref() == Some(bill_id)
            }))
        }

        fn create_notification(&self, new: NewNotification) -> Result<Notification> {
            if let Some(token) = self.0.cancel_on_create.lock().unwrap().take() {
                token.cancel();
            }
            self.0.created.lock().unwrap().push(new.clone());
            Ok(Notification {
                id: format!("n-{}", self.0.created.lock().unwrap().len()),
                user_id: new.user_id,
                kind: new.kind,
                title: new.title,
                body: new.body,
                created_at: Utc::now().to_rfc3339(),
                is_read: false,
                related_entity_id: new.related_entity_id,
            })
        }
    }
}
