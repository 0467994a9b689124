//! Coupon aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{Violations, is_code};
use spadesk_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, TenantId,
    ensure_tenant,
};
use spadesk_events::Event;
use spadesk_parties::CustomerId;

use crate::rule::{CouponScope, DiscountRule};

spadesk_core::typed_id!(CouponId, "coupon id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occasion {
    Birthday,
    Anniversary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponKind {
    /// Anyone may use the code.
    Standard,
    /// Issued to one customer by the greetings job.
    Promotion {
        customer: CustomerId,
        occasion: Occasion,
    },
    /// Bought with loyalty points.
    Rewards {
        customer: CustomerId,
        points_spent: u64,
    },
}

impl CouponKind {
    pub fn bound_customer(&self) -> Option<CustomerId> {
        match self {
            CouponKind::Standard => None,
            CouponKind::Promotion { customer, .. } | CouponKind::Rewards { customer, .. } => {
                Some(*customer)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub invoice_id: AggregateId,
    pub customer: Option<CustomerId>,
    pub redeemed_at: DateTime<Utc>,
    pub released: bool,
}

/// Everything a coupon is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponTerms {
    pub code: String,
    pub description: Option<String>,
    pub kind: CouponKind,
    pub rule: DiscountRule,
    pub max_discount: Option<Money>,
    pub min_spend: Money,
    pub scope: CouponScope,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
}

/// Partial update; code and kind are fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponPatch {
    pub description: Option<String>,
    pub rule: Option<DiscountRule>,
    pub max_discount: Option<Money>,
    pub min_spend: Option<Money>,
    pub scope: Option<CouponScope>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub tenant_id: Option<TenantId>,
    pub terms: CouponTerms,
    pub times_used: u32,
    pub redemptions: Vec<Redemption>,
    pub active: bool,
    pub deleted: bool,
    pub version: u64,
    pub created: bool,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl CouponTerms {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(
            is_code(&self.code, 3, 20),
            "code must be 3-20 characters of A-Z, 0-9 or '-'",
        );
        if let Err(DomainError::Validation(msg)) = self.rule.validate() {
            v.push(msg);
        }
        v.check(
            self.max_discount.is_none_or(Money::is_positive),
            "max_discount must be positive",
        );
        v.check(!self.min_spend.is_negative(), "min_spend must not be negative");
        v.check(self.valid_from < self.valid_until, "valid_from must be before valid_until");
        v.check(self.usage_limit != Some(0), "usage_limit must be positive");
        v.check(
            self.per_customer_limit != Some(0),
            "per_customer_limit must be positive",
        );
        v.into_result()
    }
}

impl Coupon {
    pub fn empty(id: CouponId) -> Self {
        Self {
            id,
            tenant_id: None,
            terms: CouponTerms {
                code: String::new(),
                description: None,
                kind: CouponKind::Standard,
                rule: DiscountRule::Flat(Money::ZERO),
                max_discount: None,
                min_spend: Money::ZERO,
                scope: CouponScope::All,
                valid_from: DateTime::<Utc>::MIN_UTC,
                valid_until: DateTime::<Utc>::MIN_UTC,
                usage_limit: None,
                per_customer_limit: None,
            },
            times_used: 0,
            redemptions: Vec::new(),
            active: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.terms.code
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.deleted
    }

    fn uses_by(&self, customer: CustomerId) -> u32 {
        self.redemptions
            .iter()
            .filter(|r| !r.released && r.customer == Some(customer))
            .count() as u32
    }

    /// Whether the coupon may be used right now by `customer`.
    pub fn check_applicable(&self, now: DateTime<Utc>, customer: Option<CustomerId>) -> DomainResult<()> {
        let code = &self.terms.code;
        if !self.is_visible() {
            return Err(DomainError::NotFound);
        }
        if !self.active {
            return Err(DomainError::invariant(format!("coupon {code} is inactive")));
        }
        if now < self.terms.valid_from {
            return Err(DomainError::invariant(format!("coupon {code} is not valid yet")));
        }
        if now >= self.terms.valid_until {
            return Err(DomainError::invariant(format!("coupon {code} has expired")));
        }
        if self.terms.usage_limit.is_some_and(|limit| self.times_used >= limit) {
            return Err(DomainError::invariant(format!("coupon {code} usage limit reached")));
        }
        if let Some(bound) = self.terms.kind.bound_customer() {
            if customer != Some(bound) {
                return Err(DomainError::invariant(format!(
                    "coupon {code} belongs to another customer"
                )));
            }
        }
        if let (Some(limit), Some(customer)) = (self.terms.per_customer_limit, customer) {
            if self.uses_by(customer) >= limit {
                return Err(DomainError::invariant(format!(
                    "coupon {code} already used by this customer"
                )));
            }
        }
        Ok(())
    }

    /// Discount on an eligible base, after the max-discount cap.
    pub fn discount_for(&self, eligible_base: Money) -> Money {
        let discount = self.terms.rule.discount_on(eligible_base);
        match self.terms.max_discount {
            Some(cap) => discount.min(cap),
            None => discount,
        }
    }

    fn active_redemption(&self, invoice_id: AggregateId) -> Option<&Redemption> {
        self.redemptions
            .iter()
            .find(|r| r.invoice_id == invoice_id && !r.released)
    }

    fn ensure_live(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.is_visible() {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }
}

impl AggregateRoot for Coupon {
    type Id = CouponId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CouponCommand {
    Create {
        tenant_id: TenantId,
        terms: CouponTerms,
        occurred_at: DateTime<Utc>,
    },
    Update {
        tenant_id: TenantId,
        patch: CouponPatch,
        occurred_at: DateTime<Utc>,
    },
    Deactivate {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
    Delete {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
    Redeem {
        tenant_id: TenantId,
        invoice_id: AggregateId,
        customer: Option<CustomerId>,
        occurred_at: DateTime<Utc>,
    },
    ReleaseRedemption {
        tenant_id: TenantId,
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CouponEvent {
    Created {
        tenant_id: TenantId,
        coupon_id: CouponId,
        terms: CouponTerms,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        terms: CouponTerms,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        occurred_at: DateTime<Utc>,
    },
    Redeemed {
        invoice_id: AggregateId,
        customer: Option<CustomerId>,
        occurred_at: DateTime<Utc>,
    },
    RedemptionReleased {
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for CouponEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CouponEvent::Created { .. } => "promotions.coupon.created",
            CouponEvent::Updated { .. } => "promotions.coupon.updated",
            CouponEvent::Deactivated { .. } => "promotions.coupon.deactivated",
            CouponEvent::Deleted { .. } => "promotions.coupon.deleted",
            CouponEvent::Redeemed { .. } => "promotions.coupon.redeemed",
            CouponEvent::RedemptionReleased { .. } => "promotions.coupon.redemption_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CouponEvent::Created { occurred_at, .. }
            | CouponEvent::Updated { occurred_at, .. }
            | CouponEvent::Deactivated { occurred_at }
            | CouponEvent::Deleted { occurred_at }
            | CouponEvent::Redeemed { occurred_at, .. }
            | CouponEvent::RedemptionReleased { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Coupon {
    type Command = CouponCommand;
    type Event = CouponEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CouponEvent::Created {
                tenant_id,
                coupon_id,
                terms,
                ..
            } => {
                self.id = *coupon_id;
                self.tenant_id = Some(*tenant_id);
                self.terms = terms.clone();
                self.active = true;
                self.created = true;
            }
            CouponEvent::Updated { terms, .. } => self.terms = terms.clone(),
            CouponEvent::Deactivated { .. } => self.active = false,
            CouponEvent::Deleted { .. } => {
                self.active = false;
                self.deleted = true;
            }
            CouponEvent::Redeemed {
                invoice_id,
                customer,
                occurred_at,
            } => {
                self.redemptions.push(Redemption {
                    invoice_id: *invoice_id,
                    customer: *customer,
                    redeemed_at: *occurred_at,
                    released: false,
                });
                self.times_used += 1;
            }
            CouponEvent::RedemptionReleased { invoice_id, .. } => {
                if let Some(r) = self
                    .redemptions
                    .iter_mut()
                    .find(|r| r.invoice_id == *invoice_id && !r.released)
                {
                    r.released = true;
                    self.times_used = self.times_used.saturating_sub(1);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CouponCommand::Create {
                tenant_id,
                terms,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("coupon already exists"));
                }
                let terms = CouponTerms {
                    code: normalize_code(&terms.code),
                    description: terms.description.as_ref().map(|d| d.trim().to_string()),
                    ..terms.clone()
                };
                terms.validate()?;
                Ok(vec![CouponEvent::Created {
                    tenant_id: *tenant_id,
                    coupon_id: self.id,
                    terms,
                    occurred_at: *occurred_at,
                }])
            }
            CouponCommand::Update {
                tenant_id,
                patch,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                let current = &self.terms;
                let terms = CouponTerms {
                    code: current.code.clone(),
                    description: patch.description.clone().or_else(|| current.description.clone()),
                    kind: current.kind,
                    rule: patch.rule.unwrap_or(current.rule),
                    max_discount: patch.max_discount.or(current.max_discount),
                    min_spend: patch.min_spend.unwrap_or(current.min_spend),
                    scope: patch.scope.unwrap_or(current.scope),
                    valid_from: patch.valid_from.unwrap_or(current.valid_from),
                    valid_until: patch.valid_until.unwrap_or(current.valid_until),
                    usage_limit: patch.usage_limit.or(current.usage_limit),
                    per_customer_limit: patch.per_customer_limit.or(current.per_customer_limit),
                };
                terms.validate()?;
                Ok(vec![CouponEvent::Updated {
                    terms,
                    occurred_at: *occurred_at,
                }])
            }
            CouponCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if !self.active {
                    return Err(DomainError::invariant("coupon already inactive"));
                }
                Ok(vec![CouponEvent::Deactivated {
                    occurred_at: *occurred_at,
                }])
            }
            CouponCommand::Delete {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![CouponEvent::Deleted {
                    occurred_at: *occurred_at,
                }])
            }
            CouponCommand::Redeem {
                tenant_id,
                invoice_id,
                customer,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if self.active_redemption(*invoice_id).is_some() {
                    return Err(DomainError::conflict(format!(
                        "coupon {} already redeemed on this invoice",
                        self.terms.code
                    )));
                }
                self.check_applicable(*occurred_at, *customer)?;
                Ok(vec![CouponEvent::Redeemed {
                    invoice_id: *invoice_id,
                    customer: *customer,
                    occurred_at: *occurred_at,
                }])
            }
            CouponCommand::ReleaseRedemption {
                tenant_id,
                invoice_id,
                occurred_at,
            } => {
                // Deleted coupons still release: a void may follow deletion.
                ensure_tenant(self.tenant_id, *tenant_id)?;
                if self.active_redemption(*invoice_id).is_none() {
                    return Ok(vec![]);
                }
                Ok(vec![CouponEvent::RedemptionReleased {
                    invoice_id: *invoice_id,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use spadesk_core::Rate;

    fn terms(now: DateTime<Utc>) -> CouponTerms {
        CouponTerms {
            code: " summer-10 ".into(),
            description: Some("Summer".into()),
            kind: CouponKind::Standard,
            rule: DiscountRule::Percent(Rate::from_bps(1000)),
            max_discount: Some(Money::from_minor(5_000)),
            min_spend: Money::ZERO,
            scope: CouponScope::All,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            usage_limit: Some(2),
            per_customer_limit: Some(1),
        }
    }

    fn execute(coupon: &mut Coupon, cmd: CouponCommand) -> DomainResult<usize> {
        let events = coupon.handle(&cmd)?;
        for e in &events {
            coupon.apply(e);
        }
        Ok(events.len())
    }

    fn created(tenant_id: TenantId, terms: CouponTerms) -> Coupon {
        let mut coupon = Coupon::empty(CouponId::generate());
        execute(
            &mut coupon,
            CouponCommand::Create {
                tenant_id,
                terms,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        coupon
    }

    fn redeem(coupon: &mut Coupon, tenant_id: TenantId, customer: Option<CustomerId>) -> DomainResult<AggregateId> {
        let invoice_id = AggregateId::new();
        execute(
            coupon,
            CouponCommand::Redeem {
                tenant_id,
                invoice_id,
                customer,
                occurred_at: Utc::now(),
            },
        )?;
        Ok(invoice_id)
    }

    #[test]
    fn code_is_normalized_and_validated() {
        let tenant = TenantId::new();
        let coupon = created(tenant, terms(Utc::now()));
        assert_eq!(coupon.code(), "SUMMER-10");

        let mut bad = terms(Utc::now());
        bad.code = "a b".into();
        bad.valid_until = bad.valid_from;
        let err = Coupon::empty(CouponId::generate())
            .handle(&CouponCommand::Create {
                tenant_id: tenant,
                terms: bad,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        let DomainError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("code must be"));
        assert!(msg.contains("valid_from must be before valid_until"));
    }

    #[test]
    fn discount_respects_cap() {
        let coupon = created(TenantId::new(), terms(Utc::now()));
        assert_eq!(coupon.discount_for(Money::from_minor(10_000)), Money::from_minor(1_000));
        assert_eq!(coupon.discount_for(Money::from_minor(90_000)), Money::from_minor(5_000));
    }

    #[test]
    fn usage_limits_and_release() {
        let tenant = TenantId::new();
        let mut coupon = created(tenant, terms(Utc::now()));
        let alice = CustomerId::generate();
        let bob = CustomerId::generate();

        let first = redeem(&mut coupon, tenant, Some(alice)).unwrap();
        assert!(redeem(&mut coupon, tenant, Some(alice)).is_err());
        redeem(&mut coupon, tenant, Some(bob)).unwrap();
        assert_eq!(coupon.times_used, 2);
        assert!(matches!(
            redeem(&mut coupon, tenant, None),
            Err(DomainError::InvariantViolation(_))
        ));

        let release = CouponCommand::ReleaseRedemption {
            tenant_id: tenant,
            invoice_id: first,
            occurred_at: Utc::now(),
        };
        assert_eq!(execute(&mut coupon, release.clone()).unwrap(), 1);
        assert_eq!(execute(&mut coupon, release).unwrap(), 0);
        assert_eq!(coupon.times_used, 1);
        redeem(&mut coupon, tenant, Some(alice)).unwrap();
    }

    #[test]
    fn validity_window_is_half_open() {
        let now = Utc::now();
        let coupon = created(TenantId::new(), terms(now));
        assert!(coupon.check_applicable(coupon.terms.valid_from, None).is_ok());
        assert!(coupon.check_applicable(coupon.terms.valid_until, None).is_err());
        assert!(
            coupon
                .check_applicable(coupon.terms.valid_from - Duration::seconds(1), None)
                .is_err()
        );
    }

    #[test]
    fn customer_bound_coupons_need_their_customer() {
        let tenant = TenantId::new();
        let owner = CustomerId::generate();
        let mut t = terms(Utc::now());
        t.kind = CouponKind::Rewards {
            customer: owner,
            points_spent: 500,
        };
        let coupon = created(tenant, t);

        let now = Utc::now();
        assert!(coupon.check_applicable(now, None).is_err());
        assert!(coupon.check_applicable(now, Some(CustomerId::generate())).is_err());
        assert!(coupon.check_applicable(now, Some(owner)).is_ok());
    }

    #[test]
    fn deleted_coupon_is_not_found_but_still_releases() {
        let tenant = TenantId::new();
        let mut coupon = created(tenant, terms(Utc::now()));
        let invoice = redeem(&mut coupon, tenant, None).unwrap();
        execute(
            &mut coupon,
            CouponCommand::Delete {
                tenant_id: tenant,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();

        assert_eq!(coupon.check_applicable(Utc::now(), None), Err(DomainError::NotFound));
        let released = execute(
            &mut coupon,
            CouponCommand::ReleaseRedemption {
                tenant_id: tenant,
                invoice_id: invoice,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        assert_eq!(released, 1);
    }
}
