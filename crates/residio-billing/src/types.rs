use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment. Only `Paid` counts toward a bill's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Initiated but not yet confirmed by the payment provider.
    Pending,
    Paid,
    Cancelled,
    Failed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A billable unit (typically one flat). `owner_user_id` is `None` until a
/// resident claims the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// UUIDv7 string, primary key.
    pub id: String,
    /// Human-facing account number printed on bills.
    pub number: String,
    pub owner_user_id: Option<String>,
    pub created_at: String,
}

/// A periodic charge issued to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub account_id: String,
    /// Billing period. Month granularity; stored as an ISO date.
    pub period: NaiveDate,
    pub total_amount: Decimal,
    pub created_at: String,
}

impl Bill {
    /// Period rendered as `MM.YYYY`, the form used on printed bills.
    pub fn period_label(&self) -> String {
        format!("{:02}.{}", self.period.month(), self.period.year())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub bill_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// A bill joined with its owning account and every payment applied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillWithPayments {
    pub bill: Bill,
    /// `None` when the referenced account row no longer exists.
    pub account: Option<Account>,
    pub payments: Vec<Payment>,
}

impl BillWithPayments {
    /// The resident the bill is addressed to, if the account is claimed.
    pub fn owner(&self) -> Option<&str> {
        self.account.as_ref()?.owner_user_id.as_deref()
    }

    /// Sum of all payments in `Paid` status. Pending, cancelled and failed
    /// payments are ignored.
    pub fn paid_amount(&self) -> Decimal {
        self.payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Paid)
            .map(|p| p.amount)
            .sum()
    }

    pub fn is_paid(&self) -> bool {
        self.paid_amount() >= self.bill.total_amount
    }

    /// Amount still owed; zero once the bill is settled or overpaid.
    pub fn outstanding(&self) -> Decimal {
        (self.bill.total_amount - self.paid_amount()).max(Decimal::ZERO)
    }
}

/// Result of a bill query: bills that loaded cleanly, plus the ids of bills
/// whose own row or one of whose payment rows could not be decoded.
#[derive(Debug, Clone, Default)]
pub struct BillBatch {
    pub bills: Vec<BillWithPayments>,
    pub invalid: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(total: i64, payments: &[(i64, PaymentStatus)]) -> BillWithPayments {
        BillWithPayments {
            bill: Bill {
                id: "b-1".to_string(),
                account_id: "a-1".to_string(),
                period: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                total_amount: Decimal::from(total),
                created_at: String::new(),
            },
            account: Some(Account {
                id: "a-1".to_string(),
                number: "0001".to_string(),
                owner_user_id: Some("u-1".to_string()),
                created_at: String::new(),
            }),
            payments: payments
                .iter()
                .enumerate()
                .map(|(i, (amount, status))| Payment {
                    id: format!("p-{i}"),
                    bill_id: "b-1".to_string(),
                    amount: Decimal::from(*amount),
                    status: *status,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn pending_payments_do_not_count() {
        let b = bill(1000, &[(400, PaymentStatus::Paid), (600, PaymentStatus::Pending)]);
        assert_eq!(b.paid_amount(), Decimal::from(400));
        assert!(!b.is_paid());
        assert_eq!(b.outstanding(), Decimal::from(600));
    }

    #[test]
    fn paid_payments_reaching_total_settle_the_bill() {
        let b = bill(
            1000,
            &[
                (400, PaymentStatus::Paid),
                (600, PaymentStatus::Pending),
                (600, PaymentStatus::Paid),
            ],
        );
        assert_eq!(b.paid_amount(), Decimal::from(1000));
        assert!(b.is_paid());
        assert_eq!(b.outstanding(), Decimal::ZERO);
    }

    #[test]
    fn zero_total_bill_is_paid_without_payments() {
        assert!(bill(0, &[]).is_paid());
    }

    #[test]
    fn cancelled_and_failed_are_ignored() {
        let b = bill(
            500,
            &[(500, PaymentStatus::Cancelled), (500, PaymentStatus::Failed)],
        );
        assert!(!b.is_paid());
    }

    #[test]
    fn period_label_is_month_dot_year() {
        let b = bill(1, &[]);
        assert_eq!(b.bill.period_label(), "03.2026");
    }

    #[test]
    fn owner_requires_a_claimed_account() {
        let mut b = bill(1, &[]);
        assert_eq!(b.owner(), Some("u-1"));
        b.account.as_mut().unwrap().owner_user_id = None;
        assert_eq!(b.owner(), None);
        b.account = None;
        assert_eq!(b.owner(), None);
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!("paid".parse::<PaymentStatus>(), Ok(PaymentStatus::Paid));
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
