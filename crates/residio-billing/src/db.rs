use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{types::Type, Connection};
use rust_decimal::Decimal;
use tracing::error;

use crate::error::Result;
use crate::types::{Account, Bill, BillBatch, BillWithPayments, Payment, PaymentStatus};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Initialise the billing schema in `conn`.
///
/// Safe to call on every startup. Amounts are stored as decimal TEXT so no
/// precision is lost; periods as `YYYY-MM-DD`, which keeps `<` on the column
/// a correct date comparison.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id             TEXT NOT NULL PRIMARY KEY,
            number         TEXT NOT NULL UNIQUE,
            owner_user_id  TEXT,               -- NULL while unclaimed
            created_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bills (
            id            TEXT NOT NULL PRIMARY KEY,
            account_id    TEXT NOT NULL REFERENCES accounts(id),
            period        TEXT NOT NULL,       -- YYYY-MM-DD
            total_amount  TEXT NOT NULL,       -- decimal string
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bills_period ON bills (period);

        CREATE TABLE IF NOT EXISTS payments (
            id          TEXT NOT NULL PRIMARY KEY,
            bill_id     TEXT NOT NULL REFERENCES bills(id),
            amount      TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_bill ON payments (bill_id);
        ",
    )?;
    Ok(())
}

/// All bills whose period is strictly earlier than `before`, each with its
/// account and every payment recorded against it. Ordered by period.
///
/// A bill whose row, or any of whose payment rows, fails to decode is left
/// out of `bills` and its id reported in `invalid`; one malformed row never
/// hides the remaining bills. Bills pointing at a missing account are kept
/// with `account: None`.
pub fn bills_before(conn: &Connection, before: NaiveDate) -> Result<BillBatch> {
    let before_str = before.format(DATE_FORMAT).to_string();

    let mut payments: HashMap<String, Vec<Payment>> = HashMap::new();
    let mut bad_payments: HashSet<String> = HashSet::new();
    {
        let mut stmt = conn.prepare_cached(
            "SELECT p.id, p.bill_id, p.amount, p.status, p.created_at, p.updated_at
             FROM payments p JOIN bills b ON b.id = p.bill_id
             WHERE b.period < ?1
             ORDER BY p.created_at",
        )?;
        let rows = stmt.query_map([&before_str], |row| {
            let id: String = row.get(0)?;
            let bill_id: String = row.get(1)?;
            Ok((id, bill_id, row_to_payment(row)))
        })?;
        for row in rows {
            let (payment_id, bill_id, parsed) = row?;
            match parsed {
                Ok(payment) => payments.entry(bill_id).or_default().push(payment),
                Err(e) => {
                    error!(
                        %bill_id,
                        %payment_id,
                        error = %e,
                        "malformed payment row, bill skipped"
                    );
                    bad_payments.insert(bill_id);
                }
            }
        }
    }

    let mut stmt = conn.prepare_cached(
        "SELECT b.id, b.account_id, b.period, b.total_amount, b.created_at,
                a.id, a.number, a.owner_user_id, a.created_at
         FROM bills b LEFT JOIN accounts a ON a.id = b.account_id
         WHERE b.period < ?1
         ORDER BY b.period, b.created_at",
    )?;
    let rows = stmt.query_map([&before_str], |row| {
        let id: String = row.get(0)?;
        let parsed = row_to_bill(row)
            .and_then(|bill| Ok((bill, row_to_optional_account_at(row, 5)?)));
        Ok((id, parsed))
    })?;

    let mut batch = BillBatch::default();
    for row in rows {
        let (bill_id, parsed) = row?;
        let (bill, account) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                error!(%bill_id, error = %e, "malformed bill row, skipped");
                batch.invalid.push(bill_id);
                continue;
            }
        };
        if bad_payments.contains(&bill.id) {
            batch.invalid.push(bill.id);
            continue;
        }
        let payments = payments.remove(&bill.id).unwrap_or_default();
        batch.bills.push(BillWithPayments {
            bill,
            account,
            payments,
        });
    }
    Ok(batch)
}

/// Map columns 0..=4 (id, account_id, period, total_amount, created_at).
pub(crate) fn row_to_bill(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: row.get(0)?,
        account_id: row.get(1)?,
        period: parse_date(row, 2)?,
        total_amount: parse_decimal(row, 3)?,
        created_at: row.get(4)?,
    })
}

/// Account columns from a LEFT JOIN; `None` when no account row matched.
pub(crate) fn row_to_optional_account_at(
    row: &rusqlite::Row<'_>,
    base: usize,
) -> rusqlite::Result<Option<Account>> {
    let id: Option<String> = row.get(base)?;
    if id.is_none() {
        return Ok(None);
    }
    row_to_account_at(row, base).map(Some)
}

/// Map account columns starting at `base` (id, number, owner_user_id, created_at).
pub(crate) fn row_to_account_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(base)?,
        number: row.get(base + 1)?,
        owner_user_id: row.get(base + 2)?,
        created_at: row.get(base + 3)?,
    })
}

pub(crate) fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    let status: String = row.get(3)?;
    let status = PaymentStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(Payment {
        id: row.get(0)?,
        bill_id: row.get(1)?,
        amount: parse_decimal(row, 2)?,
        status,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn parse_decimal(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
