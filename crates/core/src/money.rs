//! Money and rate value objects.
//!
//! Amounts are integer counts of the smallest currency unit; rates are basis
//! points. No floating point is involved anywhere in pricing.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Monetary amount in minor units (e.g. cents, paise).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn checked_mul(self, factor: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(factor)).map(Money)
    }

    /// Sum of `amounts`, or `None` if it does not fit.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// `self × rate`, rounded half away from zero.
    pub fn apply_rate(self, rate: Rate) -> Money {
        Money(round_div(i128::from(self.0) * i128::from(rate.0), 10_000))
    }

    /// Net amount contained in a tax-inclusive gross at `rate`.
    ///
    /// `gross × 10000 / (10000 + rate)`, rounded half away from zero.
    pub fn exclusive_of(self, rate: Rate) -> Money {
        Money(round_div(
            i128::from(self.0) * 10_000,
            10_000 + i128::from(rate.0),
        ))
    }

    /// Split `self` across `weights` proportionally.
    ///
    /// Shares are floored; the rounding remainder goes to the heaviest weight
    /// (first one on ties), so the shares always sum to `self`. When `self`
    /// does not exceed the total weight no share exceeds its own weight. A
    /// zero total weight puts everything on the first slot.
    pub fn split_pro_rata(self, weights: &[Money]) -> Vec<Money> {
        if weights.is_empty() {
            return Vec::new();
        }

        let total: i128 = weights.iter().map(|w| i128::from(w.0.max(0))).sum();
        let mut shares = vec![Money::ZERO; weights.len()];
        if total == 0 {
            shares[0] = self;
            return shares;
        }

        let amount = i128::from(self.0);
        let mut allocated: i128 = 0;
        for (share, weight) in shares.iter_mut().zip(weights) {
            let part = amount * i128::from(weight.0.max(0)) / total;
            allocated += part;
            *share = Money(part as i64);
        }

        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|a, b| weights[*b].0.cmp(&weights[*a].0));

        // Remainder goes to the heaviest weights first, without pushing any
        // share above its own weight while the amount fits in the total.
        let mut remainder = amount - allocated;
        if remainder > 0 && amount <= total {
            for idx in &order {
                let headroom = i128::from(weights[*idx].0.max(0) - shares[*idx].0);
                let give = remainder.min(headroom.max(0));
                shares[*idx].0 += give as i64;
                remainder -= give;
                if remainder == 0 {
                    break;
                }
            }
        }
        shares[order[0]].0 += remainder as i64;
        shares
    }

    pub fn ensure_non_negative(self, field: &str) -> DomainResult<Money> {
        if self.is_negative() {
            return Err(DomainError::validation(format!("{field} must not be negative")));
        }
        Ok(self)
    }

    pub fn ensure_positive(self, field: &str) -> DomainResult<Money> {
        if !self.is_positive() {
            return Err(DomainError::validation(format!("{field} must be positive")));
        }
        Ok(self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
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

/// A rate in basis points (`1800` = 18.00 %).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const HUNDRED_PERCENT: Rate = Rate(10_000);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn bps(self) -> u32 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Discount-style rates cannot exceed 100 %.
    pub fn ensure_at_most_hundred(self, field: &str) -> DomainResult<Rate> {
        if self > Rate::HUNDRED_PERCENT {
            return Err(DomainError::validation(format!(
                "{field} must not exceed 100% (10000 bps)"
            )));
        }
        Ok(self)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

fn round_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rate_rounds_half_away_from_zero() {
        assert_eq!(Money::from_minor(1000).apply_rate(Rate::from_bps(1800)), Money::from_minor(180));
        // 333 * 5% = 16.65 -> 17
        assert_eq!(Money::from_minor(333).apply_rate(Rate::from_bps(500)), Money::from_minor(17));
        // 10 * 25% = 2.5 -> 3
        assert_eq!(Money::from_minor(10).apply_rate(Rate::from_bps(2500)), Money::from_minor(3));
        assert_eq!(Money::from_minor(-10).apply_rate(Rate::from_bps(2500)), Money::from_minor(-3));
    }

    #[test]
    fn exclusive_of_extracts_net_from_inclusive_gross() {
        // 1180 incl. 18% tax -> 1000 net
        assert_eq!(Money::from_minor(1180).exclusive_of(Rate::from_bps(1800)), Money::from_minor(1000));
        assert_eq!(Money::from_minor(500).exclusive_of(Rate::ZERO), Money::from_minor(500));
    }

    #[test]
    fn split_pro_rata_assigns_remainder_to_heaviest_weight() {
        let weights = [Money::from_minor(100), Money::from_minor(300), Money::from_minor(100)];
        let shares = Money::from_minor(101).split_pro_rata(&weights);
        assert_eq!(shares, vec![Money::from_minor(20), Money::from_minor(61), Money::from_minor(20)]);
    }

    #[test]
    fn checked_sum_reports_overflow() {
        let amounts = [Money::from_minor(100), Money::from_minor(250)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(350)));
        assert_eq!(Money::checked_sum(Vec::new()), Some(Money::ZERO));
        assert_eq!(Money::checked_sum([Money::from_minor(i64::MAX), Money::from_minor(1)]), None);
    }

    #[test]
    fn split_pro_rata_with_zero_weights_uses_first_slot() {
        let shares = Money::from_minor(50).split_pro_rata(&[Money::ZERO, Money::ZERO]);
        assert_eq!(shares, vec![Money::from_minor(50), Money::ZERO]);
    }

    #[test]
    fn display_formats_major_and_minor_units() {
        assert_eq!(Money::from_minor(123_456).to_string(), "1234.56");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Rate::from_bps(1850).to_string(), "18.50%");
    }

    #[test]
    fn discount_rates_above_hundred_percent_are_rejected() {
        assert!(Rate::from_bps(10_000).ensure_at_most_hundred("rate").is_ok());
        assert!(Rate::from_bps(10_001).ensure_at_most_hundred("rate").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                .. ProptestConfig::default()
            })]

            #[test]
            fn split_pro_rata_preserves_total(
                amount in 0i64..10_000_000,
                weights in proptest::collection::vec(0i64..1_000_000, 1..12),
            ) {
                let weights: Vec<Money> = weights.into_iter().map(Money::from_minor).collect();
                let shares = Money::from_minor(amount).split_pro_rata(&weights);
                prop_assert_eq!(shares.len(), weights.len());
                prop_assert_eq!(shares.iter().sum::<Money>(), Money::from_minor(amount));
                prop_assert!(shares.iter().all(|s| !s.is_negative()));
                let total: Money = weights.iter().copied().sum();
                if Money::from_minor(amount) <= total {
                    prop_assert!(shares.iter().zip(&weights).all(|(s, w)| s <= w));
                }
            }

            #[test]
            fn inclusive_tax_never_exceeds_gross(
                gross in 0i64..10_000_000,
                bps in 0u32..5_000,
            ) {
                let gross = Money::from_minor(gross);
                let net = gross.exclusive_of(Rate::from_bps(bps));
                prop_assert!(net <= gross);
                prop_assert!(!net.is_negative());
            }
        }
    }
}
