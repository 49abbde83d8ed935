//! Exact-decimal money value.
//!
//! `Money` is a signed amount with a fixed scale of 2. Every constructor and
//! every arithmetic result is re-rounded half away from zero, so binary floating
//! point never appears in persisted state.

use core::iter::Sum;
use core::ops::{Add, Neg, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;
use crate::value_object::ValueObject;

/// Fixed scale used for all monetary amounts.
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl ValueObject for Money {}

fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Self(round2(amount))
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Build from minor units (e.g. cents): `from_minor(1050)` is `10.50`.
    pub fn from_minor(minor: i64) -> Self {
        Self::new(Decimal::new(minor, MONEY_SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `round(quantity × self, 2)`, or `None` when the product does not fit
    /// in a decimal.
    pub fn checked_times(&self, quantity: Quantity) -> Option<Self> {
        self.0.checked_mul(quantity.value()).map(Self::new)
    }

    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self::new)
    }

    /// Split a tax-inclusive amount into `(net, tax)` for a percentage rate.
    ///
    /// `net = round(self / (1 + rate/100), 2)` and `tax = self - net`, so the two
    /// parts always add back to `self` exactly.
    pub fn split_inclusive_tax(&self, rate_percent: Decimal) -> (Self, Self) {
        if rate_percent <= Decimal::ZERO {
            return (*self, Self::zero());
        }
        let divisor = Decimal::ONE + rate_percent / Decimal::ONE_HUNDRED;
        let net = Self::new(self.0 / divisor);
        (net, *self - net)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money::new(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn construction_rounds_half_away_from_zero() {
        assert_eq!(Money::new(dec!(1.005)).amount(), dec!(1.01));
        assert_eq!(Money::new(dec!(-1.005)).amount(), dec!(-1.01));
        assert_eq!(Money::new(dec!(2.004)).amount(), dec!(2.00));
    }

    #[test]
    fn display_always_has_two_decimals() {
        assert_eq!(Money::new(dec!(600)).to_string(), "600.00");
        assert_eq!(Money::from_minor(1050).to_string(), "10.50");
    }

    #[test]
    fn checked_times_rounds_line_subtotal() {
        let price = Money::new(dec!(0.33));
        assert_eq!(
            price.checked_times(Quantity::new(dec!(3.5))).map(|m| m.amount()),
            Some(dec!(1.16))
        );
    }

    #[test]
    fn overflow_is_reported_not_raised() {
        let price = Money::new(dec!(100));
        assert_eq!(price.checked_times(Quantity::new(Decimal::MAX)), None);

        let huge = Money::new(Decimal::MAX);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(huge.checked_add(Money::zero()), Some(huge));
    }

    #[test]
    fn inclusive_tax_split_adds_back() {
        let (net, tax) = Money::new(dec!(600)).split_inclusive_tax(dec!(18));
        assert_eq!(net.amount(), dec!(508.47));
        assert_eq!(tax.amount(), dec!(91.53));
        assert_eq!(net + tax, Money::new(dec!(600)));

        let (net, tax) = Money::new(dec!(10)).split_inclusive_tax(Decimal::ZERO);
        assert_eq!(net, Money::new(dec!(10)));
        assert!(tax.is_zero());
    }

    #[test]
    fn serializes_as_fixed_scale_string() {
        let json = serde_json::to_string(&Money::new(dec!(5))).unwrap();
        assert_eq!(json, "\"5.00\"");
        let back: Money = serde_json::from_str("\"1.005\"").unwrap();
        assert_eq!(back.amount(), dec!(1.01));
    }

    proptest! {
        #[test]
        fn arithmetic_stays_at_scale_two(a in -1_000_000_00i64..1_000_000_00i64, b in -1_000_000_00i64..1_000_000_00i64) {
            let x = Money::from_minor(a);
            let y = Money::from_minor(b);
            prop_assert_eq!((x + y).amount().scale(), MONEY_SCALE);
            prop_assert_eq!((x - y).amount().scale(), MONEY_SCALE);
            prop_assert_eq!((x + y) - y, x);
        }

        #[test]
        fn inclusive_split_is_exact(minor in 0i64..10_000_000i64, rate in 0u32..40u32) {
            let m = Money::from_minor(minor);
            let (net, tax) = m.split_inclusive_tax(Decimal::from(rate));
            prop_assert_eq!(net + tax, m);
            prop_assert!(!tax.is_negative());
        }
    }
}
