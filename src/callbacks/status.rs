//! Transaction status codes shared with the charging flow.
//!
//! The numeric codes are persisted by the (external) order and provider
//! subsystems; this engine reads them to decide who gets notified and writes
//! them back only through the outcome recorder.

use std::fmt;

/// Persisted transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// 1001 - order row created, charge not yet confirmed.
    Created,
    /// 1002 - charge submitted, waiting for the end user to pay.
    AwaitingPayment,
    /// 1003 - charge confirmed, merchant not yet (successfully) notified.
    AwaitingNotification,
    /// 1000 - merchant acknowledged the success callback.
    Completed,
    /// 1005 - charge failed.
    Failed,
}

impl TransactionStatus {
    /// Numeric code as stored in the `transactions` table.
    pub fn code(&self) -> i32 {
        match self {
            TransactionStatus::Created => 1001,
            TransactionStatus::AwaitingPayment => 1002,
            TransactionStatus::AwaitingNotification => 1003,
            TransactionStatus::Completed => 1000,
            TransactionStatus::Failed => 1005,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(TransactionStatus::Created),
            1002 => Some(TransactionStatus::AwaitingPayment),
            1003 => Some(TransactionStatus::AwaitingNotification),
            1000 => Some(TransactionStatus::Completed),
            1005 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "created",
            TransactionStatus::AwaitingPayment => "waiting_for_payment",
            TransactionStatus::AwaitingNotification => "waiting_for_dr_notification",
            TransactionStatus::Completed => "payment_completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Status string carried in failure notifications. Codes outside the
    /// failure sweep's reach map to an empty string, mirroring what legacy
    /// merchant integrations already receive.
    pub fn failure_label(&self) -> &'static str {
        match self {
            TransactionStatus::Failed => "failed",
            TransactionStatus::Created => "pending",
            _ => "",
        }
    }

    /// True for the state the success sweep feeds on.
    pub fn awaits_success_notification(&self) -> bool {
        matches!(self, TransactionStatus::AwaitingNotification)
    }

    /// True when an operator may re-deliver the success callback for this
    /// transaction (already completed, or confirmed but never acknowledged).
    pub fn is_redeliverable(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::AwaitingNotification
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
