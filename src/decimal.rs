use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Money type with 2 decimal places (rupees and paise)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);
    pub const PAISA: Money = Money(CENT);

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(round2(d))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(round2(Decimal::from_str(s.trim())?)))
    }

    /// create from whole rupees
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from paise
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, 2))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// round to specified decimal places
    pub fn round_dp(&self, dp: u32) -> Self {
        Money(self.0.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
    }

    /// round to the nearest whole rupee, halves away from zero
    pub fn round_whole(&self) -> Self {
        self.round_dp(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// floor at zero
    pub fn non_negative(self) -> Self {
        self.max(Money::ZERO)
    }

    /// scale by a ratio and round to the nearest whole rupee
    pub fn prorate(&self, ratio: Rate) -> Self {
        Money(self.0 * ratio.as_decimal()).round_whole()
    }

    /// split into `parts` shares that sum exactly to `self`.
    ///
    /// Shares are truncated to paise and the leftover paise go to the
    /// earliest shares, one each.
    pub fn split_even(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }

        let n = Decimal::from(parts as u64);
        let base = (self.0 / n).round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let mut residual = self.0 - base * n;
        let step = if residual.is_sign_negative() { -CENT } else { CENT };

        (0..parts)
            .map(|_| {
                if residual.is_zero() {
                    Money(base)
                } else {
                    residual -= step;
                    Money(base + step)
                }
            })
            .collect()
    }
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(round2(self.0 + other.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = round2(self.0 + other.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(round2(self.0 - other.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = round2(self.0 - other.0);
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money(round2(self.0 * other))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money(round2(self.0 / other))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// ratio type for proration factors and proportional shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// create from decimal (e.g., 0.5 for half)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from a fraction; a zero denominator yields zero
    pub fn from_ratio(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            return Rate::ZERO;
        }
        Rate(numerator / denominator)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::from(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(2))
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision() {
        let m = Money::from_str_exact("100.12567").unwrap();
        assert_eq!(m.to_string(), "100.13");

        let paise = Money::from_minor(12_345);
        assert_eq!(paise, Money::from_str_exact("123.45").unwrap());
    }

    #[test]
    fn test_round_whole_halves_away_from_zero() {
        assert_eq!(Money::from_decimal(dec!(150.5)).round_whole(), Money::from_major(151));
        assert_eq!(Money::from_decimal(dec!(262.5)).round_whole(), Money::from_major(263));
        assert_eq!(Money::from_decimal(dec!(262.49)).round_whole(), Money::from_major(262));
    }

    #[test]
    fn test_prorate() {
        // admitted on the 10th of a 30 day month: 21 of 30 days
        let ratio = Rate::from_ratio(dec!(21), dec!(30));
        assert_eq!(Money::from_major(300).prorate(ratio), Money::from_major(210));

        let ratio = Rate::from_ratio(dec!(19), dec!(28));
        // 800 * 19 / 28 = 542.857...
        assert_eq!(Money::from_major(800).prorate(ratio), Money::from_major(543));
    }

    #[test]
    fn test_split_even_is_exact() {
        let shares = Money::from_major(200).split_even(3);
        assert_eq!(
            shares,
            vec![
                Money::from_str_exact("66.67").unwrap(),
                Money::from_str_exact("66.67").unwrap(),
                Money::from_str_exact("66.66").unwrap(),
            ]
        );
        assert_eq!(shares.iter().sum::<Money>(), Money::from_major(200));

        assert_eq!(Money::from_major(90).split_even(2), vec![Money::from_major(45); 2]);
        assert!(Money::from_major(10).split_even(0).is_empty());
    }

    #[test]
    fn test_zero_is_neither_positive_nor_negative() {
        assert!(!Money::ZERO.is_positive());
        assert!(!Money::ZERO.is_negative());
        assert_eq!(Money::from_major(-5).non_negative(), Money::ZERO);
    }

    #[test]
    fn test_rate_from_zero_denominator() {
        assert_eq!(Rate::from_ratio(dec!(3), Decimal::ZERO), Rate::ZERO);
    }
}
