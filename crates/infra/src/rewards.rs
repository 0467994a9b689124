//! Loyalty points → single-use reward coupon.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use spadesk_core::{DomainError, Money, TenantId};
use spadesk_parties::{Customer, CustomerCommand, CustomerId};
use spadesk_promotions::{
    Coupon, CouponCommand, CouponId, CouponKind, CouponScope, CouponTerms, DiscountRule,
};

use crate::backoffice::Backoffice;
use crate::command_dispatcher::DispatchError;
use crate::unique_keys::KeyKind;

/// Days a reward coupon stays valid.
pub const REWARD_VALIDITY_DAYS: i64 = 90;

impl Backoffice {
    /// Spend `points` of a customer's balance on a flat coupon bound to them.
    ///
    /// The coupon is created first and deleted again if the points cannot
    /// be deducted, so a failed redemption never leaves a usable coupon.
    pub async fn redeem_reward(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        points: u64,
        now: DateTime<Utc>,
    ) -> Result<Coupon, DispatchError> {
        let program = self.account(tenant_id).await?.loyalty;
        if !program.enabled {
            return Err(DomainError::validation("loyalty program is disabled").into());
        }
        if points < u64::from(program.min_redeem_points) {
            return Err(DomainError::validation(format!(
                "at least {} points are required",
                program.min_redeem_points
            ))
            .into());
        }
        let customer = self
            .find(self.stores.customers.as_ref(), tenant_id, &customer_id)
            .await?;
        customer.ensure_active(tenant_id)?;
        if points > customer.loyalty_points {
            return Err(DomainError::invariant("insufficient loyalty points").into());
        }
        let value: Money = program
            .value_of(points)
            .ok_or_else(|| DomainError::invariant("reward value overflow"))?;

        let coupon_id = CouponId::generate();
        let key = self
            .claim_generated_code(tenant_id, KeyKind::CouponCode, coupon_id, "RW", 8)
            .await?;
        let code = key.value.clone();
        let coupon = self
            .with_unique_keys(tenant_id, coupon_id, &[], &[key.clone()], || {
                self.dispatch(
                    self.stores.coupons.as_ref(),
                    tenant_id,
                    coupon_id,
                    CouponCommand::Create {
                        tenant_id,
                        terms: CouponTerms {
                            code,
                            description: Some(format!("Reward for {points} points")),
                            kind: CouponKind::Rewards {
                                customer: customer_id,
                                points_spent: points,
                            },
                            rule: DiscountRule::Flat(value),
                            max_discount: None,
                            min_spend: Money::ZERO,
                            scope: CouponScope::All,
                            valid_from: now,
                            valid_until: now + Duration::days(REWARD_VALIDITY_DAYS),
                            usage_limit: Some(1),
                            per_customer_limit: Some(1),
                        },
                        occurred_at: now,
                    },
                    Coupon::empty,
                )
            })
            .await?;

        let deducted = self
            .dispatcher
            .dispatch_retrying(
                self.stores.customers.as_ref(),
                tenant_id,
                customer_id,
                CustomerCommand::RedeemPointsForReward {
                    tenant_id,
                    points,
                    min_points: u64::from(program.min_redeem_points),
                    occurred_at: now,
                },
                Customer::empty,
            )
            .await;
        if let Err(err) = deducted {
            let undo = self
                .dispatch(
                    self.stores.coupons.as_ref(),
                    tenant_id,
                    coupon_id,
                    CouponCommand::Delete {
                        tenant_id,
                        occurred_at: now,
                    },
                    Coupon::empty,
                )
                .await;
            match undo {
                Ok(_) => self.release_unique_keys(tenant_id, coupon_id, &[key]).await,
                Err(undo_err) => {
                    warn!(error = %undo_err, coupon = coupon.code(), "reward coupon left behind");
                }
            }
            return Err(err);
        }

        info!(coupon = coupon.code(), points, "reward redeemed");
        Ok(coupon)
    }
}
