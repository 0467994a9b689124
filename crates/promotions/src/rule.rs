use serde::{Deserialize, Serialize};

use spadesk_core::{DomainError, DomainResult, Money, Rate};

/// How a coupon computes its discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountRule {
    Percent(Rate),
    Flat(Money),
}

impl DiscountRule {
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            DiscountRule::Percent(rate) => {
                if rate.is_zero() {
                    return Err(DomainError::validation("discount rate must be positive"));
                }
                rate.ensure_at_most_hundred("discount rate")?;
            }
            DiscountRule::Flat(amount) => {
                amount.ensure_positive("discount amount")?;
            }
        }
        Ok(())
    }

    /// Discount on `base`, never more than `base`.
    pub fn discount_on(&self, base: Money) -> Money {
        if !base.is_positive() {
            return Money::ZERO;
        }
        match self {
            DiscountRule::Percent(rate) => base.apply_rate(*rate).min(base),
            DiscountRule::Flat(amount) => (*amount).min(base),
        }
    }
}

/// Which invoice lines a coupon discounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponScope {
    #[default]
    All,
    Services,
    Products,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_flat_caps_at_base() {
        let ten = DiscountRule::Percent(Rate::from_bps(1000));
        assert_eq!(ten.discount_on(Money::from_minor(1_005)), Money::from_minor(101));

        let flat = DiscountRule::Flat(Money::from_minor(500));
        assert_eq!(flat.discount_on(Money::from_minor(300)), Money::from_minor(300));
        assert_eq!(flat.discount_on(Money::ZERO), Money::ZERO);
    }

    #[test]
    fn rejects_empty_or_oversized_rules() {
        assert!(DiscountRule::Percent(Rate::ZERO).validate().is_err());
        assert!(DiscountRule::Percent(Rate::from_bps(10_001)).validate().is_err());
        assert!(DiscountRule::Flat(Money::ZERO).validate().is_err());
        assert!(DiscountRule::Percent(Rate::HUNDRED_PERCENT).validate().is_ok());
    }
}
