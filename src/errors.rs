use thiserror::Error;

use crate::decimal::Money;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeError {
    #[error("invalid billing month: {value} (expected YYYY-MM)")]
    InvalidMonth {
        value: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("no months selected for payment")]
    EmptyMonthSelection,

    #[error("unknown student: {student_id}")]
    UnknownStudent {
        student_id: String,
    },

    #[error("amount cannot be negative: {amount}")]
    NegativeAmount {
        amount: Money,
    },

    #[error("amount exceeds total due: due {total_due}, tendered {tendered}")]
    AmountExceedsDue {
        total_due: Money,
        tendered: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("invalid payment signature for order {order_id}")]
    InvalidSignature {
        order_id: String,
    },

    #[error("invalid webhook payload: {message}")]
    InvalidWebhookPayload {
        message: String,
    },

    #[error("sync failed: {message}")]
    SyncFailed {
        message: String,
    },

    #[error("request timed out after {millis}ms")]
    Timeout {
        millis: u64,
    },

    #[error("backend unreachable")]
    Offline,
}

impl FeeError {
    /// validation errors are rejected before any ledger mutation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FeeError::EmptyMonthSelection
                | FeeError::UnknownStudent { .. }
                | FeeError::NegativeAmount { .. }
                | FeeError::AmountExceedsDue { .. }
        )
    }

    /// network-level failures that should abort a sync sweep
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FeeError::Timeout { .. } | FeeError::Offline | FeeError::SyncFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FeeError>;
