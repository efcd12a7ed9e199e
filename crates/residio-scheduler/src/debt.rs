use chrono::{DateTime, Duration, NaiveDate, Utc};
use residio_billing::BillWithPayments;
use residio_core::config::DEBT_GRACE_DAYS;
use residio_notifications::{NewNotification, NotificationKind};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::store::{DebtStore, StoreFactory};

pub const DEBT_NOTICE_TITLE: &str = "Outstanding balance";

/// Bills with a period strictly earlier than this date are overdue.
///
/// `today` is the UTC calendar date of `now`, so the boundary moves once a
/// day at UTC midnight regardless of the time of the scan.
pub fn overdue_threshold(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive() - Duration::days(DEBT_GRACE_DAYS)
}

/// Tally of one scan, surfaced in logs and the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub threshold: NaiveDate,
    /// Bills older than the threshold, paid or not, malformed ones included.
    pub candidates: usize,
    pub notified: usize,
    pub skipped_paid: usize,
    pub skipped_unclaimed: usize,
    pub skipped_duplicate: usize,
    /// Bills left out because a stored row could not be decoded.
    pub skipped_invalid: usize,
    /// Cancellation was observed before every candidate was examined.
    pub interrupted: bool,
}

impl ScanReport {
    fn new(threshold: NaiveDate, candidates: usize) -> Self {
        Self {
            threshold,
            candidates,
            notified: 0,
            skipped_paid: 0,
            skipped_unclaimed: 0,
            skipped_duplicate: 0,
            skipped_invalid: 0,
            interrupted: false,
        }
    }
}

enum Outcome {
    Notified,
    Paid,
    Unclaimed,
    AlreadyNotified,
}

/// One pass over overdue bills. Stateless between scans; everything it knows
/// comes from the store opened for that scan.
pub struct DebtScanner<F> {
    factory: F,
}

impl<F: StoreFactory> DebtScanner<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Scan bills as of `now` and notify owners of unpaid overdue ones.
    ///
    /// Cancellation is checked before each bill; a bill already being
    /// processed is always finished. The store is acquired here and dropped
    /// on return, including when a query fails part-way.
    #[instrument(skip(self, cancel))]
    pub fn scan(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<ScanReport> {
        let threshold = overdue_threshold(now);
        let store = self.factory.open()?;

        let batch = store.bills_before(threshold)?;
        let mut report = ScanReport::new(threshold, batch.bills.len() + batch.invalid.len());
        report.skipped_invalid = batch.invalid.len();
        debug!(
            %threshold,
            candidates = report.candidates,
            invalid = report.skipped_invalid,
            "overdue candidates loaded"
        );

        for item in &batch.bills {
            if cancel.is_cancelled() {
                report.interrupted = true;
                info!(
                    examined = report.notified
                        + report.skipped_paid
                        + report.skipped_unclaimed
                        + report.skipped_duplicate,
                    "debt scan interrupted by shutdown"
                );
                break;
            }
            match process_bill(&store, item)? {
                Outcome::Notified => report.notified += 1,
                Outcome::Paid => report.skipped_paid += 1,
                Outcome::Unclaimed => report.skipped_unclaimed += 1,
                Outcome::AlreadyNotified => report.skipped_duplicate += 1,
            }
        }

        Ok(report)
    }
}

fn process_bill<S: DebtStore>(store: &S, item: &BillWithPayments) -> Result<Outcome> {
    let bill = &item.bill;

    if item.is_paid() {
        return Ok(Outcome::Paid);
    }
    let Some(owner) = item.owner() else {
        debug!(bill_id = %bill.id, account_id = %bill.account_id, "overdue bill on unclaimed account");
        return Ok(Outcome::Unclaimed);
    };
    // Check-then-insert: not atomic across processes, see DESIGN.md.
    if store.debt_notice_exists(&bill.id)? {
        return Ok(Outcome::AlreadyNotified);
    }

    let notification = store.create_notification(debt_notice(item, owner))?;
    info!(
        bill_id = %bill.id,
        user_id = %owner,
        notification_id = %notification.id,
        period = %bill.period_label(),
        "debt notification created"
    );
    Ok(Outcome::Notified)
}

/// Build the notification for an overdue bill addressed to `owner`.
pub fn debt_notice(item: &BillWithPayments, owner: &str) -> NewNotification {
    let bill = &item.bill;
    NewNotification {
        user_id: owner.to_string(),
        kind: NotificationKind::Debt,
        title: DEBT_NOTICE_TITLE.to_string(),
        body: format!(
            "Your bill for {} totalling {} has not been paid. Please settle the outstanding balance.",
            bill.period_label(),
            format_amount(bill.total_amount)
        ),
        related_entity_id: Some(bill.id.clone()),
    }
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
