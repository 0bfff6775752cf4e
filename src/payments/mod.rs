pub mod gateway;
pub mod receipt;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::ledger::MonthAllocation;
use crate::types::{BillingMonth, FeeHeads, PaymentMethod, StudentId};

pub use gateway::{
    GatewayConfig, SignatureVerifier, VerifiedPayment, WebhookEvent, WebhookEventKind,
};
pub use receipt::{format_receipt_number, Receipt, STATUS_COMPLETED};

/// payment request for one or more months
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub student_id: StudentId,
    /// months to settle, in application order
    pub months: Vec<BillingMonth>,
    /// per-month head amounts; zero drops the head
    pub head_overrides: FeeHeads,
    /// total discount across all months
    pub discount: Money,
    /// replaces the computed late fee when set
    pub late_fee_override: Option<Money>,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: String,
}

impl PaymentRequest {
    pub fn new(
        student_id: impl Into<String>,
        months: Vec<BillingMonth>,
        amount: Money,
        method: PaymentMethod,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            months,
            head_overrides: FeeHeads::new(),
            discount: Money::ZERO,
            late_fee_override: None,
            amount,
            method,
            reference: String::new(),
        }
    }

    pub fn with_head_override(mut self, head: impl Into<String>, amount: Money) -> Self {
        self.head_overrides.insert(head.into(), amount);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_late_fee_override(mut self, late_fee: Money) -> Self {
        self.late_fee_override = Some(late_fee);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// checks that need no ledger state
    pub fn validate(&self) -> Result<()> {
        if self.months.is_empty() {
            return Err(FeeError::EmptyMonthSelection);
        }
        let negative = [Some(self.amount), Some(self.discount), self.late_fee_override]
            .into_iter()
            .flatten()
            .chain(self.head_overrides.values().copied())
            .find(Money::is_negative);
        if let Some(amount) = negative {
            return Err(FeeError::NegativeAmount { amount });
        }
        Ok(())
    }

    /// selected months with repeats dropped, first occurrence kept
    pub fn distinct_months(&self) -> Vec<BillingMonth> {
        let mut seen = std::collections::BTreeSet::new();
        self.months
            .iter()
            .copied()
            .filter(|m| seen.insert(*m))
            .collect()
    }
}

/// what a payment did to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// absent when nothing was tendered
    pub receipt: Option<Receipt>,
    pub allocations: Vec<MonthAllocation>,
    pub total_due: Money,
    pub late_fee: Money,
    /// shortfall carried to the following month
    pub previous_unpaid: Money,
    pub carried_to: Option<BillingMonth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(month: u32) -> BillingMonth {
        BillingMonth::new(2026, month).unwrap()
    }

    #[test]
    fn test_validation() {
        let ok = PaymentRequest::new("A-1", vec![m(1)], Money::from_major(100), PaymentMethod::Cash);
        assert!(ok.validate().is_ok());

        let empty = PaymentRequest::new("A-1", vec![], Money::from_major(100), PaymentMethod::Cash);
        assert_eq!(empty.validate(), Err(FeeError::EmptyMonthSelection));

        let negative = PaymentRequest::new("A-1", vec![m(1)], Money::from_major(-1), PaymentMethod::Cash);
        assert!(matches!(negative.validate(), Err(FeeError::NegativeAmount { .. })));

        let bad_discount = ok.clone().with_discount(Money::from_major(-5));
        assert!(bad_discount.validate().unwrap_err().is_validation());

        let bad_head = ok.with_head_override("Lab", Money::from_major(-5));
        assert!(bad_head.validate().is_err());
    }

    #[test]
    fn test_distinct_months_keep_order() {
        let req = PaymentRequest::new(
            "A-1",
            vec![m(3), m(1), m(3), m(2), m(1)],
            Money::ZERO,
            PaymentMethod::Upi,
        );
        assert_eq!(req.distinct_months(), vec![m(3), m(1), m(2)]);
    }
}
