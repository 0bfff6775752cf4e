use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{BillingMonth, PaymentMethod, StudentId};

pub const STATUS_COMPLETED: &str = "Completed";

/// immutable record of a settled payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// local identity, stable across syncs
    pub id: Uuid,
    /// human-readable display number, e.g. "R-0007"
    #[serde(alias = "no")]
    pub number: String,
    pub date: NaiveDate,
    pub student_id: StudentId,
    #[serde(default)]
    pub student_name: String,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default, alias = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_unpaid: Option<Money>,
    #[serde(default)]
    pub months: Vec<BillingMonth>,
    #[serde(default = "completed")]
    pub status: String,
    #[serde(default)]
    pub synced: bool,
    /// id assigned by the backend ledger once synced
    #[serde(default)]
    pub backend_id: Option<String>,
}

fn completed() -> String {
    STATUS_COMPLETED.to_string()
}

impl Receipt {
    /// status compared case-insensitively; blank counts as completed
    pub fn is_completed(&self) -> bool {
        let status = self.status.trim();
        status.is_empty() || status.eq_ignore_ascii_case(STATUS_COMPLETED)
    }

    pub fn is_pending_sync(&self) -> bool {
        !self.synced
    }

    /// "Fees 2026-01, 2026-02" or "Fee" when no months are attached
    pub fn purpose(&self) -> String {
        if self.months.is_empty() {
            return "Fee".to_string();
        }
        let months: Vec<String> = self.months.iter().map(ToString::to_string).collect();
        format!("Fees {}", months.join(", "))
    }

    /// "Carry ₹700" when part of the due was carried forward
    pub fn remarks(&self) -> String {
        match self.previous_unpaid {
            Some(carry) if carry.is_positive() => format!("Carry ₹{}", carry),
            _ => String::new(),
        }
    }

    /// key used to match local receipts against backend records
    pub fn merge_key(&self) -> String {
        match &self.backend_id {
            Some(id) => format!("id:{}", id),
            None => format!("local:{}", self.number),
        }
    }
}

/// display number for the n-th receipt: prefix plus a four digit sequence
pub fn format_receipt_number(prefix: &str, sequence: usize) -> String {
    format!("{}{:04}", prefix, sequence)
}
