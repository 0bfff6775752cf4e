use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};

/// admission / roll number, unique per student
pub type StudentId = String;

/// head name -> monthly amount
pub type FeeHeads = BTreeMap<String, Money>;

pub const TUITION: &str = "Tuition";
pub const TRANSPORT: &str = "Transport";
pub const MISCELLANEOUS: &str = "Miscellaneous";
pub const PREVIOUS_UNPAID: &str = "Previous Unpaid";

/// a calendar month in "YYYY-MM" form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingMonth(NaiveDate);

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=9999).contains(&year) {
            return Err(FeeError::InvalidMonth {
                value: format!("{}-{:02}", year, month),
            });
        }
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(BillingMonth)
            .ok_or_else(|| FeeError::InvalidMonth {
                value: format!("{:04}-{:02}", year, month),
            })
    }

    /// month containing the given date, clamped to 0001-01..=9999-12
    pub fn from_date(date: NaiveDate) -> Self {
        let date = clamp_to_supported(date);
        BillingMonth(date - Duration::days(i64::from(date.day()) - 1))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.year(), self.month())
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.0 + Duration::days(i64::from(self.days_in_month()) - 1)
    }

    /// the given day of this month, clamped into 1..=days_in_month
    pub fn day(&self, day: u32) -> NaiveDate {
        let day = day.clamp(1, self.days_in_month());
        self.0 + Duration::days(i64::from(day) - 1)
    }

    /// saturates at 9999-12
    pub fn next(&self) -> Self {
        BillingMonth::from_date(self.last_day() + Duration::days(1))
    }

    /// saturates at 0001-01
    pub fn previous(&self) -> Self {
        BillingMonth::from_date(self.0 - Duration::days(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        BillingMonth::from_date(date) == *self
    }

    /// Miscellaneous is collected quarterly: January, April, July, October
    pub fn is_quarterly_surcharge_month(&self) -> bool {
        matches!(self.month(), 1 | 4 | 7 | 10)
    }

    /// months from `start` (inclusive) to `end` (exclusive)
    pub fn months_between(start: BillingMonth, end: BillingMonth) -> Vec<BillingMonth> {
        let mut months = Vec::new();
        let mut current = start;
        while current < end {
            months.push(current);
            current = current.next();
        }
        months
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for BillingMonth {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FeeError::InvalidMonth {
            value: s.to_string(),
        };

        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !all_digits(year) || !all_digits(month) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        BillingMonth::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = FeeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BillingMonth> for String {
    fn from(month: BillingMonth) -> Self {
        month.to_string()
    }
}

fn clamp_to_supported(date: NaiveDate) -> NaiveDate {
    match (
        NaiveDate::from_ymd_opt(1, 1, 1),
        NaiveDate::from_ymd_opt(9999, 12, 31),
    ) {
        (Some(lower), Some(upper)) => date.clamp(lower, upper),
        _ => date,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// parse an ISO "YYYY-MM-DD" date
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| FeeError::InvalidDate {
        message: format!("{}: {}", s, e),
    })
}

/// enrolment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Left,
}

/// student record as read from the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub section: String,
    pub admission_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: StudentStatus,
    /// id assigned by the backend of record, once known
    #[serde(default)]
    pub backend_id: Option<String>,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class_name: class_name.into(),
            section: String::new(),
            admission_date: None,
            status: StudentStatus::Active,
            backend_id: None,
        }
    }

    pub fn with_admission_date(mut self, date: NaiveDate) -> Self {
        self.admission_date = Some(date);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    pub fn with_backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    pub fn admission_month(&self) -> Option<BillingMonth> {
        self.admission_date.map(BillingMonth::from_date)
    }
}

/// how a payment was tendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Upi,
    Card,
    Cheque,
    BankTransfer,
    Razorpay,
    #[serde(other)]
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::BankTransfer => "banktransfer",
            PaymentMethod::Razorpay => "razorpay",
            PaymentMethod::Other => "other",
        }
    }

    pub fn is_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Razorpay)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// transport route assignment for a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportAssignment {
    pub student_id: StudentId,
    pub route_id: String,
    #[serde(default)]
    pub stop: String,
    pub fee: Money,
    pub active: bool,
}
