use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::ledger::record::{record_key, MonthlyFeeRecord};
use crate::payments::receipt::{format_receipt_number, Receipt};
use crate::types::{BillingMonth, PaymentMethod, StudentId};

/// persisted ledger: fee records and receipts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LedgerState {
    /// keyed "<studentId>|<YYYY-MM>"
    #[serde(default)]
    pub fees: BTreeMap<String, MonthlyFeeRecord>,
    /// append-only, in issue order
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

/// a payment as reported by the backend ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReceipt {
    /// absent for rows the backend echoes back before assigning an id
    #[serde(default)]
    pub id: Option<String>,
    /// local display number, used to match when there is no id
    #[serde(default, alias = "no")]
    pub number: Option<String>,
    pub date: NaiveDate,
    pub student_id: StudentId,
    #[serde(default)]
    pub student_name: String,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub status: String,
}

/// counts from a receipt merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub updated: usize,
    pub added: usize,
}

impl BackendReceipt {
    /// same key layout as [`Receipt::merge_key`]
    pub fn merge_key(&self) -> Option<String> {
        match (&self.id, &self.number) {
            (Some(id), _) => Some(format!("id:{}", id)),
            (None, Some(number)) => Some(format!("local:{}", number)),
            (None, None) => None,
        }
    }
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, student_id: &str, month: BillingMonth) -> Option<&MonthlyFeeRecord> {
        self.fees.get(&record_key(student_id, month))
    }

    pub fn record_mut(
        &mut self,
        student_id: &str,
        month: BillingMonth,
    ) -> Option<&mut MonthlyFeeRecord> {
        self.fees.get_mut(&record_key(student_id, month))
    }

    pub fn insert_record(&mut self, student_id: &str, month: BillingMonth, record: MonthlyFeeRecord) {
        self.fees.insert(record_key(student_id, month), record);
    }

    /// next display number: receipt count + 1, bumped past any number in use
    pub fn next_receipt_number(&self, prefix: &str) -> String {
        let mut sequence = self.receipts.len() + 1;
        loop {
            let candidate = format_receipt_number(prefix, sequence);
            if !self.receipts.iter().any(|r| r.number == candidate) {
                return candidate;
            }
            sequence += 1;
        }
    }

    pub fn receipt(&self, id: Uuid) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.id == id)
    }

    pub fn pending_receipts(&self) -> impl Iterator<Item = &Receipt> {
        self.receipts.iter().filter(|r| r.is_pending_sync())
    }

    /// mark a receipt synced and attach the backend id
    pub fn mark_synced(&mut self, id: Uuid, backend_id: &str) -> Option<&Receipt> {
        let receipt = self.receipts.iter_mut().find(|r| r.id == id)?;
        receipt.synced = true;
        receipt.backend_id = Some(backend_id.to_string());
        Some(receipt)
    }

    /// Fold backend receipts into the local list. Matching is by backend id
    /// when the row has one, else by local receipt number. Backend fields win; the months and
    /// carry amount only exist locally and are kept. Unmatched backend
    /// receipts are appended.
    pub fn merge_receipts(&mut self, backend: Vec<BackendReceipt>) -> MergeSummary {
        let mut index: HashMap<String, usize> = self
            .receipts
            .iter()
            .enumerate()
            .map(|(i, r)| (r.merge_key(), i))
            .collect();
        let mut summary = MergeSummary::default();

        for remote in backend {
            let Some(key) = remote.merge_key() else {
                tracing::warn!(student_id = %remote.student_id, "backend receipt without id or number skipped");
                continue;
            };
            match index.get(&key) {
                Some(&i) => {
                    let local = &mut self.receipts[i];
                    local.date = remote.date;
                    local.student_id = remote.student_id;
                    local.student_name = remote.student_name;
                    local.amount = remote.amount;
                    local.method = remote.method;
                    local.reference = remote.reference;
                    local.status = remote.status;
                    if remote.id.is_some() {
                        local.backend_id = remote.id;
                    }
                    local.synced = true;
                    summary.updated += 1;
                }
                None => {
                    self.receipts.push(Receipt {
                        id: Uuid::new_v4(),
                        number: remote
                            .number
                            .or_else(|| remote.id.clone())
                            .unwrap_or_default(),
                        date: remote.date,
                        student_id: remote.student_id,
                        student_name: remote.student_name,
                        amount: remote.amount,
                        method: remote.method,
                        reference: remote.reference,
                        previous_unpaid: None,
                        months: Vec::new(),
                        status: remote.status,
                        synced: true,
                        backend_id: remote.id,
                    });
                    index.insert(key, self.receipts.len() - 1);
                    summary.added += 1;
                }
            }
        }

        summary
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeeError::InvalidConfiguration {
            message: format!("ledger state: {}", e),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FeeError::InvalidConfiguration {
            message: format!("ledger state: {}", e),
        })
    }
}
