/// serialization support for a student's fee position
use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::decimal::Money;
use crate::errors::Result;
use crate::ledger::{FeeLedger, MonthStatus, UnpaidSummary};
use crate::payments::Receipt;
use crate::types::{BillingMonth, FeeHeads, PaymentMethod, StudentId, StudentStatus};

/// serializable view of one student's fees
#[derive(Debug, Serialize, Deserialize)]
pub struct StudentFeeView {
    pub student_id: StudentId,
    pub name: String,
    pub class_name: String,
    pub section: String,
    pub status: StudentStatus,
    pub as_of: NaiveDate,
    pub months: Vec<MonthStatus>,
    /// true when no admission date was recorded
    pub months_estimated: bool,
    pub totals: UnpaidSummary,
    pub current: CurrentMonthView,
    pub receipts: Vec<ReceiptView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentMonthView {
    pub month: BillingMonth,
    pub heads: FeeHeads,
    pub due: Money,
    /// late fee if the month were paid today
    pub late_fee: Money,
    pub transport_fee: Option<Money>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptView {
    pub number: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub purpose: String,
    pub remarks: String,
    pub synced: bool,
}

impl ReceiptView {
    fn from_receipt(receipt: &Receipt) -> Self {
        ReceiptView {
            number: receipt.number.clone(),
            date: receipt.date,
            amount: receipt.amount,
            method: receipt.method,
            purpose: receipt.purpose(),
            remarks: receipt.remarks(),
            synced: receipt.synced,
        }
    }
}

impl StudentFeeView {
    pub fn from_ledger(
        ledger: &FeeLedger,
        student_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        let student = ledger.require_student(student_id)?;
        let today = time_provider.now().date_naive();
        let range = ledger.months_since_admission(student_id, time_provider)?;
        let months = ledger.month_statuses(student_id, time_provider)?;
        let totals = ledger.total_unpaid(student_id, time_provider)?;

        let current_month = BillingMonth::from_date(today);
        let current_record = match ledger.record(student_id, current_month) {
            Some(record) => record.clone(),
            None => ledger.fresh_record(student, current_month),
        };
        let included: BTreeSet<String> = current_record
            .included_heads()
            .map(str::to_string)
            .collect();
        let late_fee = ledger.compute_late_fee(student_id, current_month, today, &included);

        Ok(StudentFeeView {
            student_id: student.id.clone(),
            name: student.name.clone(),
            class_name: student.class_name.clone(),
            section: student.section.clone(),
            status: student.status,
            as_of: today,
            months,
            months_estimated: range.used_fallback,
            totals,
            current: CurrentMonthView {
                month: current_month,
                due: current_record.due(),
                heads: current_record.heads,
                late_fee,
                transport_fee: ledger.transport_fee(student_id),
            },
            receipts: ledger
                .state()
                .receipts
                .iter()
                .filter(|r| r.student_id == student.id)
                .map(ReceiptView::from_receipt)
                .collect(),
        })
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
