use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::decimal::Money;
use crate::late_fee::calendar::{due_date, BusinessCalendar};
use crate::late_fee::rules::LateFeeRuleSet;
use crate::types::BillingMonth;

/// why a calculation produced no fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaiverReason {
    /// none of the included heads carries a late fee
    HeadsNotApplicable,
    /// the billing month is after the as-of month
    FutureMonth,
    /// as-of date is on or before the charge start
    WithinGrace,
}

/// late fee calculation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateFeeCalculation {
    pub amount: Money,
    pub month: BillingMonth,
    pub due_date: Option<NaiveDate>,
    pub charge_start: Option<NaiveDate>,
    pub chargeable_days: u32,
    /// slab total before the cap
    pub uncapped_amount: Money,
    pub cap_applied: bool,
    pub waived: Option<WaiverReason>,
}

impl LateFeeCalculation {
    fn waived(month: BillingMonth, reason: WaiverReason) -> Self {
        Self {
            amount: Money::ZERO,
            month,
            due_date: None,
            charge_start: None,
            chargeable_days: 0,
            uncapped_amount: Money::ZERO,
            cap_applied: false,
            waived: Some(reason),
        }
    }
}

/// engine for calculating slab-based late fees
pub struct LateFeeEngine<'a> {
    rules: &'a LateFeeRuleSet,
}

impl<'a> LateFeeEngine<'a> {
    pub fn new(rules: &'a LateFeeRuleSet) -> Self {
        Self { rules }
    }

    /// late fee owed on `month` as of `as_of`, in whole rupees
    pub fn compute_late_fee(
        &self,
        class_name: &str,
        month: BillingMonth,
        as_of: NaiveDate,
        included_heads: &BTreeSet<String>,
    ) -> Money {
        self.calculate(class_name, month, as_of, included_heads).amount
    }

    /// full breakdown of the late fee calculation
    pub fn calculate(
        &self,
        class_name: &str,
        month: BillingMonth,
        as_of: NaiveDate,
        included_heads: &BTreeSet<String>,
    ) -> LateFeeCalculation {
        if !self.rules.head_gate_allows(included_heads) {
            return LateFeeCalculation::waived(month, WaiverReason::HeadsNotApplicable);
        }
        if month > BillingMonth::from_date(as_of) {
            return LateFeeCalculation::waived(month, WaiverReason::FutureMonth);
        }

        let effective = self.rules.effective_for_class(class_name);
        let calendar = BusinessCalendar::from_rules(self.rules);

        let due = due_date(month, effective.cutoff_day, &calendar, self.rules.shift_rule);
        let charge_start =
            due + Duration::days(i64::from(effective.grace_days) + i64::from(effective.start_after));

        if as_of <= charge_start {
            return LateFeeCalculation {
                due_date: Some(due),
                charge_start: Some(charge_start),
                ..LateFeeCalculation::waived(month, WaiverReason::WithinGrace)
            };
        }

        let chargeable_days = calendar.count_business_days(charge_start, as_of);
        let uncapped_amount = self.rules.apply_slabs(chargeable_days);

        let cap_applied = effective.cap.is_positive() && uncapped_amount > effective.cap;
        let capped = if cap_applied { effective.cap } else { uncapped_amount };

        LateFeeCalculation {
            amount: capped.round_whole().non_negative(),
            month,
            due_date: Some(due),
            charge_start: Some(charge_start),
            chargeable_days,
            uncapped_amount,
            cap_applied,
            waived: None,
        }
    }
}
