//! Business settings owned by the account and consumed by pricing and
//! invoice numbering.

use serde::{Deserialize, Serialize};

use spadesk_core::validation::Violations;
use spadesk_core::{DomainResult, Money, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSettings {
    /// Rate used for catalog items without their own rate.
    pub default_rate: Rate,
    /// Whether catalog prices already contain tax.
    pub prices_include_tax: bool,
}

impl Default for TaxSettings {
    fn default() -> Self {
        Self {
            default_rate: Rate::ZERO,
            prices_include_tax: false,
        }
    }
}

impl TaxSettings {
    pub fn validate(&self) -> DomainResult<()> {
        self.default_rate.ensure_at_most_hundred("default_rate")?;
        Ok(())
    }
}

/// When the per-outlet invoice counter restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceReset {
    Yearly,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingPolicy {
    pub prefix: String,
    pub padding: u8,
    pub reset: SequenceReset,
}

impl Default for NumberingPolicy {
    fn default() -> Self {
        Self {
            prefix: "INV".to_string(),
            padding: 5,
            reset: SequenceReset::Yearly,
        }
    }
}

impl NumberingPolicy {
    pub const MIN_PADDING: u8 = 3;
    pub const MAX_PADDING: u8 = 10;

    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(
            (1..=8).contains(&self.prefix.len())
                && self.prefix.chars().all(|c| c.is_ascii_alphanumeric()),
            "prefix must be 1-8 letters or digits",
        );
        v.check(
            (Self::MIN_PADDING..=Self::MAX_PADDING).contains(&self.padding),
            "padding must be between 3 and 10",
        );
        v.into_result()
    }
}

/// Birthday/anniversary coupon issued by the greetings job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayCoupon {
    pub rate: Rate,
    pub valid_days: u32,
}

/// Loyalty points, cashback wallet and referral settings.
///
/// Points are earned per whole `spend_unit` of amount due and are worth
/// `point_value` each when redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    pub enabled: bool,
    pub spend_unit: Money,
    pub points_per_unit: u32,
    pub point_value: Money,
    pub min_redeem_points: u32,
    pub cashback_rate: Rate,
    pub referral_discount_rate: Rate,
    pub referrer_reward_points: u32,
    pub birthday_coupon: Option<BirthdayCoupon>,
}

impl Default for LoyaltyProgram {
    fn default() -> Self {
        Self {
            enabled: false,
            spend_unit: Money::from_minor(10_000),
            points_per_unit: 1,
            point_value: Money::from_minor(100),
            min_redeem_points: 100,
            cashback_rate: Rate::ZERO,
            referral_discount_rate: Rate::ZERO,
            referrer_reward_points: 0,
            birthday_coupon: None,
        }
    }
}

impl LoyaltyProgram {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(self.spend_unit.is_positive(), "spend_unit must be positive");
        v.check(self.point_value.is_positive(), "point_value must be positive");
        v.check(
            self.cashback_rate <= Rate::HUNDRED_PERCENT,
            "cashback_rate must be at most 100%",
        );
        v.check(
            self.referral_discount_rate <= Rate::HUNDRED_PERCENT,
            "referral_discount_rate must be at most 100%",
        );
        if let Some(bc) = self.birthday_coupon {
            v.check(
                !bc.rate.is_zero() && bc.rate <= Rate::HUNDRED_PERCENT,
                "birthday_coupon.rate must be between 0.01% and 100%",
            );
            v.check(bc.valid_days > 0, "birthday_coupon.valid_days must be positive");
        }
        v.into_result()
    }

    /// Points earned for an invoice whose amount due is `amount_due`.
    pub fn points_for(&self, amount_due: Money) -> u64 {
        if !self.enabled || !self.spend_unit.is_positive() || !amount_due.is_positive() {
            return 0;
        }
        let units = amount_due.minor() / self.spend_unit.minor();
        u64::try_from(units).unwrap_or(0) * u64::from(self.points_per_unit)
    }

    /// Cashback credited to the wallet for `amount_due`.
    pub fn cashback_for(&self, amount_due: Money) -> Money {
        if !self.enabled || !amount_due.is_positive() {
            return Money::ZERO;
        }
        amount_due.apply_rate(self.cashback_rate)
    }

    /// Monetary value of `points`.
    pub fn value_of(&self, points: u64) -> Option<Money> {
        let points = i64::try_from(points).ok()?;
        self.point_value.minor().checked_mul(points).map(Money::from_minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_policy_bounds() {
        assert!(NumberingPolicy::default().validate().is_ok());
        let bad = NumberingPolicy {
            prefix: "IN V".into(),
            padding: 2,
            reset: SequenceReset::Never,
        };
        assert_eq!(
            bad.validate().unwrap_err().to_string(),
            "validation failed: prefix must be 1-8 letters or digits, padding must be between 3 and 10"
        );
    }

    #[test]
    fn earning_floors_whole_spend_units() {
        let program = LoyaltyProgram {
            enabled: true,
            spend_unit: Money::from_minor(10_000),
            points_per_unit: 5,
            cashback_rate: Rate::from_bps(250),
            ..LoyaltyProgram::default()
        };
        assert_eq!(program.points_for(Money::from_minor(29_999)), 10);
        assert_eq!(program.cashback_for(Money::from_minor(10_000)), Money::from_minor(250));
    }

    #[test]
    fn disabled_program_earns_nothing() {
        let program = LoyaltyProgram::default();
        assert_eq!(program.points_for(Money::from_minor(1_000_000)), 0);
        assert_eq!(program.cashback_for(Money::from_minor(1_000_000)), Money::ZERO);
    }
}
