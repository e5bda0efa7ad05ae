//! Currency-scaled amounts and signed percentages.
//!
//! Prices are exact decimals held at two places, so sums over many books are
//! exact and justification deltas match what a human gets by subtracting the
//! printed values.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const CENT_PLACES: u32 = 2;
/// Percentages are computed to hundredths, then shown to tenths.
const PERCENT_PLACES: u32 = 2;
const PERCENT_LABEL_PLACES: u32 = 1;

/// Round half away from zero to `places` and pin the scale there.
fn fixed(value: Decimal, places: u32) -> Decimal {
    let mut out = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    out.rescale(places);
    out
}

/// An amount in dollars, always rounded to the cent.
///
/// Serialises as a decimal number (`12.34`) for the surrounding web layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, CENT_PLACES))
    }

    /// Round an exact decimal to the nearest cent.
    pub fn from_decimal(amount: Decimal) -> Self {
        Self(fixed(amount, CENT_PLACES))
    }

    /// Round a floating-point dollar amount to the nearest cent.
    ///
    /// Non-finite input maps to zero; callers screen model output before this.
    pub fn from_dollars(dollars: f64) -> Self {
        Decimal::from_f64_retain(dollars).map_or(Self::ZERO, Self::from_decimal)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    /// Whole cents, saturating at the `i64` range.
    pub fn cents(self) -> i64 {
        let cents = (self.0 * Decimal::ONE_HUNDRED).trunc();
        cents.to_i64().unwrap_or(if cents.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    pub fn dollars(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// Signed change from `base` to `self`, with the percentage relative to `base`.
    pub fn delta_from(self, base: Money) -> Delta {
        let amount = self - base;
        let percent = (!base.0.is_zero()).then(|| {
            fixed(
                amount.0 / base.0.abs() * Decimal::ONE_HUNDRED,
                PERCENT_PLACES,
            )
        });
        Delta { amount, percent }
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::from_decimal(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0.is_sign_negative() && !self.0.is_zero() {
            "-"
        } else {
            ""
        };
        write!(f, "{sign}${}", fixed(self.0.abs(), CENT_PLACES))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Money;

    fn mul(self, rhs: u32) -> Money {
        Money(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// A signed change between two amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub amount: Money,
    /// Change relative to the base, in percent to two places. `None` when the base is zero.
    pub percent: Option<Decimal>,
}

impl Delta {
    /// Magnitude of the change as a percentage string with one decimal (`49.8%`).
    pub fn percent_label(&self) -> Option<String> {
        self.percent
            .map(|pct| format!("{}%", fixed(pct.abs(), PERCENT_LABEL_PLACES)))
    }
}

impl fmt::Display for Delta {
    /// `-282.88 (49.8%)`, or `+12.00` when the base was zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.amount.amount();
        let sign = if amount.is_sign_negative() && !amount.is_zero() {
            '-'
        } else {
            '+'
        };
        write!(f, "{sign}{}", fixed(amount.abs(), CENT_PLACES))?;
        if let Some(pct) = self.percent_label() {
            write!(f, " ({pct})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_to_nearest_cent() {
        assert_eq!(Money::from_dollars(4.499).cents(), 450);
        assert_eq!(Money::from_dollars(0.005).cents(), 1);
        assert_eq!(Money::from_dollars(-0.005).cents(), -1);
        assert_eq!(Money::from_dollars(f64::NAN), Money::ZERO);
        assert_eq!(Money::from_decimal(dec!(142.865)), Money::from_cents(14287));
    }

    #[test]
    fn display_formats_dollars() {
        assert_eq!(Money::from_cents(56862).to_string(), "$568.62");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Money::from_decimal(dec!(12)).to_string(), "$12.00");
    }

    #[test]
    fn delta_matches_hand_arithmetic() {
        let individual = Money::from_cents(56862);
        let lot = Money::from_cents(28574);
        let delta = lot.delta_from(individual);
        assert_eq!(delta.amount.cents(), -28288);
        assert_eq!(delta.percent, Some(dec!(-49.75)));
        assert_eq!(delta.to_string(), "-282.88 (49.8%)");
    }

    #[test]
    fn positive_delta_has_plus_sign() {
        let delta = Money::from_cents(1100).delta_from(Money::from_cents(1000));
        assert_eq!(delta.to_string(), "+1.00 (10.0%)");
    }

    #[test]
    fn zero_base_has_no_percentage() {
        let delta = Money::from_cents(1200).delta_from(Money::ZERO);
        assert_eq!(delta.percent, None);
        assert_eq!(delta.to_string(), "+12.00");
    }

    #[test]
    fn serde_uses_decimal_dollars() {
        let json = serde_json::to_string(&Money::from_cents(28574)).unwrap();
        assert_eq!(json, "285.74");
        let back: Money = serde_json::from_str("285.74").unwrap();
        assert_eq!(back.cents(), 28574);
        let short: Money = serde_json::from_str("12.3").unwrap();
        assert_eq!(short, Money::from_cents(1230));
    }

    #[test]
    fn sums_exactly() {
        let total: Money = [Money::from_dollars(0.1), Money::from_dollars(0.2)].iter().sum();
        assert_eq!(total, Money::from_cents(30));
        assert_eq!(Money::from_cents(250) * 3, Money::from_cents(750));
    }
}
