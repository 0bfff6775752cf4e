use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

use crate::late_fee::rules::{LateFeeRuleSet, ShiftRule};
use crate::types::BillingMonth;

/// business-day view of the late fee rules
#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar<'a> {
    pub skip_saturday: bool,
    pub skip_sunday: bool,
    pub holidays: &'a BTreeSet<NaiveDate>,
}

impl<'a> BusinessCalendar<'a> {
    pub fn from_rules(rules: &'a LateFeeRuleSet) -> Self {
        Self {
            skip_saturday: rules.skip_saturday,
            skip_sunday: rules.skip_sunday,
            holidays: &rules.holidays,
        }
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        match date.weekday() {
            Weekday::Sat if self.skip_saturday => false,
            Weekday::Sun if self.skip_sunday => false,
            _ => !self.holidays.contains(&date),
        }
    }

    /// move a non-business date per the shift rule.
    ///
    /// Bounded to a year of stepping so a calendar where every day is a
    /// holiday cannot loop forever.
    pub fn shift(&self, date: NaiveDate, rule: ShiftRule) -> NaiveDate {
        let step = match rule {
            ShiftRule::None => return date,
            ShiftRule::NextBusinessDay => Duration::days(1),
            ShiftRule::PreviousBusinessDay => Duration::days(-1),
        };

        let mut current = date;
        for _ in 0..366 {
            if self.is_business_day(current) {
                return current;
            }
            current += step;
        }
        date
    }

    /// business days in `(start, end]`; zero when `end <= start`
    pub fn count_business_days(&self, start_exclusive: NaiveDate, end_inclusive: NaiveDate) -> u32 {
        let mut count = 0;
        let mut current = start_exclusive + Duration::days(1);
        while current <= end_inclusive {
            if self.is_business_day(current) {
                count += 1;
            }
            current += Duration::days(1);
        }
        count
    }
}

/// cutoff day clamped into the month, then shifted off non-business days
pub fn due_date(
    month: BillingMonth,
    cutoff_day: u32,
    calendar: &BusinessCalendar<'_>,
    rule: ShiftRule,
) -> NaiveDate {
    calendar.shift(month.day(cutoff_day), rule)
}
