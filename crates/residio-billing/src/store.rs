use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{
    row_to_account_at, row_to_bill, row_to_optional_account_at, row_to_payment, DATE_FORMAT,
};
use crate::error::{BillingError, Result};
use crate::types::{Account, Bill, BillWithPayments, Payment, PaymentStatus};

/// Writer for accounts, bills and payments.
///
/// Wraps a single SQLite connection in a `Mutex`, the same way the portal's
/// other subsystems share their connections across request handlers.
pub struct BillingStore {
    db: Mutex<Connection>,
}

impl BillingStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a billable account. Pass `None` for an unclaimed account.
    #[instrument(skip(self))]
    pub fn create_account(&self, number: &str, owner_user_id: Option<&str>) -> Result<Account> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO accounts (id, number, owner_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, number, owner_user_id, now],
        )?;
        info!(account_id = %id, %number, "account created");
        Ok(Account {
            id,
            number: number.to_string(),
            owner_user_id: owner_user_id.map(String::from),
            created_at: now,
        })
    }

    /// Claim (`Some`) or release (`None`) an account.
    #[instrument(skip(self))]
    pub fn assign_owner(&self, account_id: &str, owner_user_id: Option<&str>) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE accounts SET owner_user_id = ?1 WHERE id = ?2",
            rusqlite::params![owner_user_id, account_id],
        )?;
        if n == 0 {
            return Err(BillingError::AccountNotFound {
                id: account_id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_account(&self, account_id: &str) -> Result<Account> {
        match self.conn().query_row(
            "SELECT id, number, owner_user_id, created_at FROM accounts WHERE id = ?1",
            [account_id],
            |row| row_to_account_at(row, 0),
        ) {
            Ok(a) => Ok(a),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(BillingError::AccountNotFound {
                id: account_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a bill for `period`. Totals must be non-negative.
    #[instrument(skip(self))]
    pub fn issue_bill(&self, account_id: &str, period: NaiveDate, total: Decimal) -> Result<Bill> {
        if total.is_sign_negative() {
            return Err(BillingError::InvalidAmount(format!(
                "bill total must not be negative, got {total}"
            )));
        }
        // Surfaces AccountNotFound instead of a bare foreign-key failure.
        self.get_account(account_id)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO bills (id, account_id, period, total_amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id,
                account_id,
                period.format(DATE_FORMAT).to_string(),
                total.to_string(),
                now
            ],
        )?;
        info!(bill_id = %id, %account_id, %period, "bill issued");
        Ok(Bill {
            id,
            account_id: account_id.to_string(),
            period,
            total_amount: total,
            created_at: now,
        })
    }

    /// Record a payment against a bill. Amounts must be positive.
    #[instrument(skip(self))]
    pub fn record_payment(
        &self,
        bill_id: &str,
        amount: Decimal,
        status: PaymentStatus,
    ) -> Result<Payment> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM bills WHERE id = ?1)",
            [bill_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(BillingError::BillNotFound {
                id: bill_id.to_string(),
            });
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO payments (id, bill_id, amount, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, bill_id, amount.to_string(), status.to_string(), now],
        )?;
        info!(payment_id = %id, %bill_id, %status, "payment recorded");
        Ok(Payment {
            id,
            bill_id: bill_id.to_string(),
            amount,
            status,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Move a payment to a new status (e.g. provider callback confirming it).
    #[instrument(skip(self))]
    pub fn set_payment_status(&self, payment_id: &str, status: PaymentStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let n = self.conn().execute(
            "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.to_string(), now, payment_id],
        )?;
        if n == 0 {
            return Err(BillingError::PaymentNotFound {
                id: payment_id.to_string(),
            });
        }
        Ok(())
    }

    /// Load a bill with its account and payments.
    #[instrument(skip(self))]
    pub fn get_bill(&self, bill_id: &str) -> Result<BillWithPayments> {
        let conn = self.conn();
        let (bill, account) = match conn.query_row(
            "SELECT b.id, b.account_id, b.period, b.total_amount, b.created_at,
                    a.id, a.number, a.owner_user_id, a.created_at
             FROM bills b LEFT JOIN accounts a ON a.id = b.account_id
             WHERE b.id = ?1",
            [bill_id],
            |row| Ok((row_to_bill(row)?, row_to_optional_account_at(row, 5)?)),
        ) {
            Ok(pair) => pair,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(BillingError::BillNotFound {
                    id: bill_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut stmt = conn.prepare(
            "SELECT id, bill_id, amount, status, created_at, updated_at
             FROM payments WHERE bill_id = ?1 ORDER BY created_at",
        )?;
        let payments = stmt
            .query_map([bill_id], row_to_payment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(BillWithPayments {
            bill,
            account,
            payments,
        })
    }
}
