use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::ledger::FeeLedger;
use crate::types::{BillingMonth, FeeHeads, Student};

/// months a student can be billed for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRange {
    pub months: Vec<BillingMonth>,
    /// no admission date, so the last twelve months were used
    pub used_fallback: bool,
}

/// unpaid totals across the months since admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnpaidSummary {
    pub total_due: Money,
    pub total_paid: Money,
    pub months_count: usize,
    pub unpaid_months: usize,
}

/// one row of a student's month picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthStatus {
    pub month: BillingMonth,
    pub due: Money,
    pub paid: Money,
    pub settled: bool,
    pub previously_collected: bool,
}

/// Admission month through the month of `today`, inclusive. Without an
/// admission date, the twelve months ending with the current one.
pub fn months_since_admission(student: &Student, today: NaiveDate) -> MonthRange {
    let current = BillingMonth::from_date(today);
    match student.admission_month() {
        Some(start) => MonthRange {
            months: BillingMonth::months_between(start, current.next()),
            used_fallback: false,
        },
        None => {
            let mut start = current;
            for _ in 0..11 {
                start = start.previous();
            }
            MonthRange {
                months: BillingMonth::months_between(start, current.next()),
                used_fallback: true,
            }
        }
    }
}

impl FeeLedger {
    /// completed receipts dated in the current month
    pub fn collected_this_month(&self, time_provider: &SafeTimeProvider) -> Money {
        self.completed_this_month(time_provider).map(|r| r.amount).sum()
    }

    pub fn count_receipts_this_month(&self, time_provider: &SafeTimeProvider) -> usize {
        self.completed_this_month(time_provider).count()
    }

    /// sum of every student's due for the current month
    pub fn outstanding_this_month(&self, time_provider: &SafeTimeProvider) -> Money {
        let current = BillingMonth::from_date(time_provider.now().date_naive());
        self.students().map(|s| self.due(&s.id, current)).sum()
    }

    /// Dues from each student's admission month up to, not including, the
    /// current month. Students without an admission date are skipped.
    pub fn overdue_total(&self, time_provider: &SafeTimeProvider) -> Money {
        let current = BillingMonth::from_date(time_provider.now().date_naive());
        self.students()
            .filter_map(|student| {
                let start = student.admission_month()?;
                Some(
                    BillingMonth::months_between(start, current)
                        .into_iter()
                        .map(|month| self.due(&student.id, month))
                        .sum::<Money>(),
                )
            })
            .sum()
    }

    pub fn months_since_admission(
        &self,
        student_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<MonthRange> {
        let student = self.require_student(student_id)?;
        Ok(months_since_admission(student, time_provider.now().date_naive()))
    }

    pub fn month_statuses(
        &self,
        student_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<MonthStatus>> {
        let range = self.months_since_admission(student_id, time_provider)?;
        Ok(range
            .months
            .into_iter()
            .map(|month| {
                let record = self.record(student_id, month);
                let due = self.due(student_id, month);
                MonthStatus {
                    month,
                    due,
                    paid: record.map(|r| r.paid).unwrap_or(Money::ZERO),
                    settled: due.is_zero(),
                    previously_collected: record.map_or(false, |r| r.is_previously_collected()),
                }
            })
            .collect())
    }

    pub fn total_unpaid(
        &self,
        student_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<UnpaidSummary> {
        let statuses = self.month_statuses(student_id, time_provider)?;
        Ok(UnpaidSummary {
            total_due: statuses.iter().map(|s| s.due).sum(),
            total_paid: statuses.iter().map(|s| s.paid).sum(),
            months_count: statuses.len(),
            unpaid_months: statuses.iter().filter(|s| s.due.is_positive()).count(),
        })
    }

    /// Head totals across the months, each reduced by its share of what the
    /// months already have paid. Display only; nothing is stored.
    pub fn aggregate_heads(&self, student_id: &str, months: &[BillingMonth]) -> Result<FeeHeads> {
        let student = self.require_student(student_id)?;

        let mut aggregated = FeeHeads::new();
        let mut already_paid = Money::ZERO;
        for &month in months {
            let record = match self.record(student_id, month) {
                Some(record) => record.clone(),
                None => self.fresh_record(student, month),
            };
            already_paid += record.paid;
            for (head, amount) in record.heads {
                *aggregated.entry(head).or_insert(Money::ZERO) += amount;
            }
        }

        let total: Money = aggregated.values().sum();
        if already_paid.is_positive() && total.is_positive() {
            for amount in aggregated.values_mut() {
                let share = Rate::from_ratio(amount.as_decimal(), total.as_decimal());
                let reduction = already_paid * share.as_decimal();
                *amount = (*amount - reduction).non_negative();
            }
        }

        Ok(aggregated)
    }

    fn completed_this_month<'a>(
        &'a self,
        time_provider: &SafeTimeProvider,
    ) -> impl Iterator<Item = &'a crate::payments::Receipt> + 'a {
        let current = BillingMonth::from_date(time_provider.now().date_naive());
        self.state()
            .receipts
            .iter()
            .filter(move |r| current.contains(r.date) && r.is_completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::payments::PaymentRequest;
    use crate::schedule::FeeHeadSchedule;
    use crate::types::PaymentMethod;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;

    fn time_at(y: i32, m: u32, d: u32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()))
    }

    fn month(s: &str) -> BillingMonth {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger() -> FeeLedger {
        let schedule = FeeHeadSchedule::new()
            .with_class("I", [("Tuition", Money::from_major(1000))])
            .with_class("II", [("Tuition", Money::from_major(600)), ("Lab", Money::from_major(200))]);
        let mut ledger = FeeLedger::new(FeeConfig::with_schedule(schedule)).unwrap();
        ledger.upsert_student(Student::new("A-1", "Asha", "I").with_admission_date(date(2025, 12, 1)));
        ledger.upsert_student(Student::new("B-2", "Bilal", "II").with_admission_date(date(2026, 2, 15)));
        ledger.upsert_student(Student::new("C-3", "Chen", "I"));
        ledger
    }

    #[test]
    fn test_months_since_admission() {
        let student = Student::new("A-1", "Asha", "I").with_admission_date(date(2025, 11, 20));
        let range = months_since_admission(&student, date(2026, 2, 25));
        assert!(!range.used_fallback);
        assert_eq!(
            range.months,
            vec![month("2025-11"), month("2025-12"), month("2026-01"), month("2026-02")]
        );

        let future = Student::new("F-1", "Farah", "I").with_admission_date(date(2026, 5, 1));
        assert!(months_since_admission(&future, date(2026, 2, 25)).months.is_empty());
    }

    #[test]
    fn test_months_fallback_without_admission() {
        let student = Student::new("C-3", "Chen", "I");
        let range = months_since_admission(&student, date(2026, 2, 25));
        assert!(range.used_fallback);
        assert_eq!(range.months.len(), 12);
        assert_eq!(range.months.first(), Some(&month("2025-03")));
        assert_eq!(range.months.last(), Some(&month("2026-02")));
    }

    #[test]
    fn test_collected_and_count_this_month() {
        let mut ledger = ledger();
        let feb = time_at(2026, 2, 20);
        ledger
            .record_payment(
                PaymentRequest::new("A-1", vec![month("2026-01")], Money::from_major(400), PaymentMethod::Cash),
                &feb,
            )
            .unwrap();
        ledger
            .record_payment(
                PaymentRequest::new("A-1", vec![month("2026-02")], Money::from_major(300), PaymentMethod::Upi),
                &feb,
            )
            .unwrap();

        assert_eq!(ledger.collected_this_month(&feb), Money::from_major(700));
        assert_eq!(ledger.count_receipts_this_month(&feb), 2);

        let march = time_at(2026, 3, 2);
        assert_eq!(ledger.collected_this_month(&march), Money::ZERO);
        assert_eq!(ledger.count_receipts_this_month(&march), 0);
    }

    #[test]
    fn test_outstanding_this_month() {
        let ledger = ledger();
        let time = time_at(2026, 2, 5);

        // A-1 1000, B-2 prorated 800 * 14/28 = 400, C-3 1000
        assert_eq!(ledger.outstanding_this_month(&time), Money::from_major(2400));
    }

    #[test]
    fn test_overdue_skips_missing_admission_and_current_month() {
        let mut ledger = ledger();
        let time = time_at(2026, 2, 5);

        // A-1: Dec + Jan; B-2 admitted this month; C-3 skipped
        assert_eq!(ledger.overdue_total(&time), Money::from_major(2000));

        ledger
            .record_payment(
                PaymentRequest::new("A-1", vec![month("2025-12")], Money::from_major(1000), PaymentMethod::Cash)
                    .with_late_fee_override(Money::ZERO),
                &time,
            )
            .unwrap();
        assert_eq!(ledger.overdue_total(&time), Money::from_major(1000));
    }

    #[test]
    fn test_total_unpaid_and_statuses() {
        let mut ledger = ledger();
        let time = time_at(2026, 2, 5);
        ledger
            .mark_previously_collected("A-1", &[month("2025-12")], &time)
            .unwrap();
        ledger
            .record_payment(
                PaymentRequest::new("A-1", vec![month("2026-01")], Money::from_major(250), PaymentMethod::Cash)
                    .with_late_fee_override(Money::ZERO),
                &time,
            )
            .unwrap();

        let statuses = ledger.month_statuses("A-1", &time).unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].previously_collected && statuses[0].settled);
        assert_eq!(statuses[1].due, Money::from_major(750));

        // the 750 shortfall is carried to March, outside the range
        let summary = ledger.total_unpaid("A-1", &time).unwrap();
        assert_eq!(summary.months_count, 3);
        assert_eq!(summary.total_paid, Money::from_major(1250));
        assert_eq!(summary.total_due, Money::from_major(1750));
        assert_eq!(summary.unpaid_months, 2);

        assert!(ledger.total_unpaid("Z-9", &time).is_err());
    }

    #[test]
    fn test_aggregate_heads_reduced_by_paid() {
        let mut ledger = ledger();
        let time = time_at(2026, 3, 5);
        ledger
            .record_payment(
                PaymentRequest::new("B-2", vec![month("2026-03")], Money::from_major(800), PaymentMethod::Cash),
                &time,
            )
            .unwrap();

        // two months of 600 + 200, with March's 800 spread 3:1
        let heads = ledger
            .aggregate_heads("B-2", &[month("2026-03"), month("2026-04")])
            .unwrap();
        assert_eq!(heads["Tuition"], Money::from_major(600));
        assert_eq!(heads["Lab"], Money::from_major(200));

        // nothing stored for April
        assert!(ledger.record("B-2", month("2026-04")).is_none());
    }
}
