use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::heads_total;
use crate::types::{BillingMonth, FeeHeads};

/// `last_receipt_ref` of months settled outside the ledger
pub const PREVIOUSLY_COLLECTED_REF: &str = "PREVIOUS";

/// storage key of a month's record: "<studentId>|<YYYY-MM>"
pub fn record_key(student_id: &str, month: BillingMonth) -> String {
    format!("{}|{}", student_id, month)
}

/// fees owed and credited for one student in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFeeRecord {
    pub heads: FeeHeads,
    #[serde(default)]
    pub paid: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub late_fee: Money,
    #[serde(default, alias = "lastReceipt")]
    pub last_receipt_ref: Option<String>,
}

impl MonthlyFeeRecord {
    pub fn new(heads: FeeHeads) -> Self {
        Self {
            heads,
            ..Self::default()
        }
    }

    pub fn head_total(&self) -> Money {
        heads_total(&self.heads)
    }

    /// max(0, heads + late fee - discount - paid)
    pub fn due(&self) -> Money {
        (self.head_total() + self.late_fee - self.discount - self.paid).non_negative()
    }

    pub fn is_settled(&self) -> bool {
        self.due().is_zero()
    }

    pub fn is_previously_collected(&self) -> bool {
        self.last_receipt_ref.as_deref() == Some(PREVIOUSLY_COLLECTED_REF)
    }

    /// heads with a non-zero amount
    pub fn included_heads(&self) -> impl Iterator<Item = &str> {
        self.heads
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(head, _)| head.as_str())
    }
}
