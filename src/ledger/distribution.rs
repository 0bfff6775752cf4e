use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::BillingMonth;

/// amount applied to one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthAllocation {
    pub month: BillingMonth,
    pub due_before: Money,
    pub applied: Money,
}

impl MonthAllocation {
    pub fn remaining_due(&self) -> Money {
        self.due_before - self.applied
    }
}

/// result of spreading a payment over months
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub allocations: Vec<MonthAllocation>,
    pub total_due: Money,
    pub applied: Money,
    /// tendered amount left after every month was covered
    pub unapplied: Money,
}

impl Distribution {
    /// due left across the months after this payment
    pub fn shortfall(&self) -> Money {
        (self.total_due - self.applied).non_negative()
    }
}

/// Walk the months in the given order, applying `min(remaining, due)` to
/// each. A month with nothing due gets nothing.
pub fn distribute(tendered: Money, dues: &[(BillingMonth, Money)]) -> Distribution {
    let mut remaining = tendered.non_negative();
    let mut allocations = Vec::with_capacity(dues.len());

    for &(month, due) in dues {
        let due = due.non_negative();
        let applied = remaining.min(due);
        remaining -= applied;
        allocations.push(MonthAllocation {
            month,
            due_before: due,
            applied,
        });
    }

    Distribution {
        total_due: allocations.iter().map(|a| a.due_before).sum(),
        applied: allocations.iter().map(|a| a.applied).sum(),
        unapplied: remaining,
        allocations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(month: u32) -> BillingMonth {
        BillingMonth::new(2026, month).unwrap()
    }

    #[test]
    fn test_fills_months_in_order() {
        let dues = [(m(3), Money::from_major(500)), (m(1), Money::from_major(700)), (m(2), Money::from_major(400))];
        let d = distribute(Money::from_major(1000), &dues);

        let applied: Vec<_> = d.allocations.iter().map(|a| (a.month, a.applied)).collect();
        assert_eq!(
            applied,
            vec![
                (m(3), Money::from_major(500)),
                (m(1), Money::from_major(500)),
                (m(2), Money::ZERO),
            ]
        );
        assert_eq!(d.total_due, Money::from_major(1600));
        assert_eq!(d.shortfall(), Money::from_major(600));
        assert_eq!(d.unapplied, Money::ZERO);
    }

    #[test]
    fn test_zero_due_month_receives_nothing() {
        let dues = [(m(1), Money::ZERO), (m(2), Money::from_major(300))];
        let d = distribute(Money::from_major(300), &dues);

        assert_eq!(d.allocations[0].applied, Money::ZERO);
        assert_eq!(d.allocations[1].applied, Money::from_major(300));
        assert_eq!(d.allocations[1].remaining_due(), Money::ZERO);
    }

    #[test]
    fn test_conserves_tendered_amount() {
        let dues = [
            (m(1), Money::from_str_exact("433.33").unwrap()),
            (m(2), Money::from_str_exact("433.33").unwrap()),
            (m(3), Money::from_str_exact("433.34").unwrap()),
        ];
        for tendered in [0, 1, 433, 900, 1300] {
            let tendered = Money::from_major(tendered);
            let d = distribute(tendered, &dues);
            assert_eq!(d.applied + d.unapplied, tendered);
            assert_eq!(d.applied + d.shortfall(), d.total_due);
        }
    }
}
