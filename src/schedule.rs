/// fee schedule resolution
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::{Money, Rate};
use crate::errors::{FeeError, Result};
use crate::types::{BillingMonth, FeeHeads, Student, MISCELLANEOUS, TUITION};

/// class name -> head name -> monthly amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FeeHeadSchedule {
    classes: BTreeMap<String, FeeHeads>,
}

impl FeeHeadSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// add a class with its heads
    pub fn with_class<I, K>(mut self, class_name: &str, heads: I) -> Self
    where
        I: IntoIterator<Item = (K, Money)>,
        K: Into<String>,
    {
        self.classes.insert(
            class_name.to_string(),
            heads.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }

    pub fn heads_for(&self, class_name: &str) -> Option<&FeeHeads> {
        self.classes.get(class_name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn set_head(&mut self, class_name: &str, head: &str, amount: Money) -> Result<()> {
        if amount.is_negative() {
            return Err(FeeError::InvalidConfiguration {
                message: format!("head {} for class {} cannot be negative", head, class_name),
            });
        }
        self.classes
            .entry(class_name.to_string())
            .or_default()
            .insert(head.to_string(), amount);
        Ok(())
    }

    /// remove a head; returns the removed amount
    pub fn remove_head(&mut self, class_name: &str, head: &str) -> Option<Money> {
        self.classes.get_mut(class_name)?.remove(head)
    }

    pub fn validate(&self) -> Result<()> {
        for (class_name, heads) in &self.classes {
            if let Some((head, amount)) = heads.iter().find(|(_, a)| a.is_negative()) {
                return Err(FeeError::InvalidConfiguration {
                    message: format!(
                        "head {} for class {} cannot be negative: {}",
                        head, class_name, amount
                    ),
                });
            }
        }
        Ok(())
    }
}

/// what heads are being resolved for
#[derive(Debug, Clone, Copy)]
pub enum HeadSubject<'a> {
    /// bare class name, no proration
    Class(&'a str),
    /// full student record, prorated by admission date
    Student(&'a Student),
}

/// Resolves fee heads against a schedule. The quarterly `Miscellaneous`
/// gate applies to every lookup; admission proration only when a student
/// is supplied.
pub struct FeeScheduleResolver<'a> {
    schedule: &'a FeeHeadSchedule,
    fallback_tuition: Money,
}

impl<'a> FeeScheduleResolver<'a> {
    pub fn new(schedule: &'a FeeHeadSchedule, fallback_tuition: Money) -> Self {
        Self {
            schedule,
            fallback_tuition,
        }
    }

    pub fn resolve_heads(&self, subject: HeadSubject<'_>, month: BillingMonth) -> FeeHeads {
        match subject {
            HeadSubject::Class(class_name) => self.resolve_heads_for_class(class_name, month),
            HeadSubject::Student(student) => self.resolve_heads_for_student(student, month),
        }
    }

    /// schedule heads for a class with the quarterly gate applied
    pub fn resolve_heads_for_class(&self, class_name: &str, month: BillingMonth) -> FeeHeads {
        let mut heads = match self.schedule.heads_for(class_name) {
            Some(heads) => heads.clone(),
            None => FeeHeads::from([(TUITION.to_string(), self.fallback_tuition)]),
        };

        if !month.is_quarterly_surcharge_month() {
            heads.remove(MISCELLANEOUS);
        }

        heads
    }

    /// class heads adjusted for the student's admission date
    pub fn resolve_heads_for_student(&self, student: &Student, month: BillingMonth) -> FeeHeads {
        let heads = self.resolve_heads_for_class(&student.class_name, month);

        let Some(admitted) = student.admission_date else {
            return heads;
        };

        if admitted > month.last_day() {
            return FeeHeads::new();
        }
        if admitted <= month.first_day() {
            return heads;
        }

        let days = month.days_in_month();
        let remaining = days - admitted.day() + 1;
        let ratio = Rate::from_ratio(Decimal::from(remaining), Decimal::from(days));

        heads
            .into_iter()
            .map(|(head, amount)| (head, amount.prorate(ratio)))
            .collect()
    }
}

/// total of all heads
pub fn heads_total(heads: &FeeHeads) -> Money {
    heads.values().sum()
}
