//! Customer aggregate: contact details plus the loyalty ledger.
//!
//! Points and the cashback wallet only move through invoice settlements,
//! referral awards and reward redemptions. Each settlement is recorded per
//! invoice so voiding can apply its exact inverse.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{Violations, is_valid_email, normalize_email};
use spadesk_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, TenantId,
    ensure_tenant,
};
use spadesk_events::Event;

spadesk_core::typed_id!(CustomerId, "customer id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// Loyalty movements booked for one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub invoice_id: AggregateId,
    pub points_redeemed: u64,
    pub points_earned: u64,
    pub wallet_debited: Money,
    pub wallet_credited: Money,
    pub spend: Money,
    pub reversed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub birthday: Option<NaiveDate>,
    pub anniversary: Option<NaiveDate>,
    pub notes: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<CustomerId>,
    pub loyalty_points: u64,
    pub wallet_balance: Money,
    pub invoice_count: u32,
    pub lifetime_spend: Money,
    pub settlements: Vec<Settlement>,
    /// Referees this customer has already been rewarded for.
    pub rewarded_referees: Vec<CustomerId>,
    pub active: bool,
    pub deleted: bool,
    pub registered_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl Customer {
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            email: None,
            phone: None,
            gender: None,
            birthday: None,
            anniversary: None,
            notes: None,
            referral_code: String::new(),
            referred_by: None,
            loyalty_points: 0,
            wallet_balance: Money::ZERO,
            invoice_count: 0,
            lifetime_spend: Money::ZERO,
            settlements: Vec::new(),
            rewarded_referees: Vec::new(),
            active: false,
            deleted: false,
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.deleted
    }

    /// Referral discount applies to the first invoice of a referred customer.
    pub fn is_referral_eligible(&self) -> bool {
        self.referred_by.is_some() && self.invoice_count == 0
    }

    /// Fails unless the customer can be invoiced.
    pub fn ensure_active(&self, tenant_id: TenantId) -> DomainResult<()> {
        self.ensure_live(tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant("customer is inactive"));
        }
        Ok(())
    }

    pub fn settlement_for(&self, invoice_id: AggregateId) -> Option<&Settlement> {
        self.settlements.iter().find(|s| s.invoice_id == invoice_id)
    }

    fn ensure_live(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.is_visible() {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Contact fields; on update `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub birthday: Option<NaiveDate>,
    pub anniversary: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub tenant_id: TenantId,
    pub details: CustomerPatch,
    /// Generated by the application layer (8 uppercase letters/digits).
    pub referral_code: String,
    pub referred_by: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: AggregateId,
    pub points_redeemed: u64,
    pub points_earned: u64,
    pub wallet_debited: Money,
    pub wallet_credited: Money,
    pub spend: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomerCommand {
    Register(RegisterCustomer),
    UpdateDetails {
        tenant_id: TenantId,
        patch: CustomerPatch,
        occurred_at: DateTime<Utc>,
    },
    Deactivate {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
    Activate {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
    Delete {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
    SettleInvoice(SettleInvoice),
    ReverseInvoice {
        tenant_id: TenantId,
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
    AwardReferralPoints {
        tenant_id: TenantId,
        referee: CustomerId,
        points: u64,
        occurred_at: DateTime<Utc>,
    },
    RedeemPointsForReward {
        tenant_id: TenantId,
        points: u64,
        min_points: u64,
        occurred_at: DateTime<Utc>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub birthday: Option<NaiveDate>,
    pub anniversary: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomerEvent {
    Registered {
        tenant_id: TenantId,
        customer_id: CustomerId,
        details: CustomerDetails,
        referral_code: String,
        referred_by: Option<CustomerId>,
        occurred_at: DateTime<Utc>,
    },
    DetailsUpdated {
        details: CustomerDetails,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        occurred_at: DateTime<Utc>,
    },
    Activated {
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        occurred_at: DateTime<Utc>,
    },
    InvoiceSettled {
        settlement: Settlement,
        occurred_at: DateTime<Utc>,
    },
    InvoiceReversed {
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
    ReferralPointsAwarded {
        referee: CustomerId,
        points: u64,
        occurred_at: DateTime<Utc>,
    },
    PointsRedeemedForReward {
        points: u64,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::Registered { .. } => "parties.customer.registered",
            CustomerEvent::DetailsUpdated { .. } => "parties.customer.details_updated",
            CustomerEvent::Deactivated { .. } => "parties.customer.deactivated",
            CustomerEvent::Activated { .. } => "parties.customer.activated",
            CustomerEvent::Deleted { .. } => "parties.customer.deleted",
            CustomerEvent::InvoiceSettled { .. } => "parties.customer.invoice_settled",
            CustomerEvent::InvoiceReversed { .. } => "parties.customer.invoice_reversed",
            CustomerEvent::ReferralPointsAwarded { .. } => "parties.customer.referral_points_awarded",
            CustomerEvent::PointsRedeemedForReward { .. } => "parties.customer.points_redeemed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::Registered { occurred_at, .. }
            | CustomerEvent::DetailsUpdated { occurred_at, .. }
            | CustomerEvent::Deactivated { occurred_at }
            | CustomerEvent::Activated { occurred_at }
            | CustomerEvent::Deleted { occurred_at }
            | CustomerEvent::InvoiceSettled { occurred_at, .. }
            | CustomerEvent::InvoiceReversed { occurred_at, .. }
            | CustomerEvent::ReferralPointsAwarded { occurred_at, .. }
            | CustomerEvent::PointsRedeemedForReward { occurred_at, .. } => *occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::Registered {
                tenant_id,
                customer_id,
                details,
                referral_code,
                referred_by,
                occurred_at,
            } => {
                self.id = *customer_id;
                self.tenant_id = Some(*tenant_id);
                self.set_details(details);
                self.referral_code = referral_code.clone();
                self.referred_by = *referred_by;
                self.registered_at = Some(*occurred_at);
                self.active = true;
                self.created = true;
            }
            CustomerEvent::DetailsUpdated { details, .. } => self.set_details(details),
            CustomerEvent::Deactivated { .. } => self.active = false,
            CustomerEvent::Activated { .. } => self.active = true,
            CustomerEvent::Deleted { .. } => {
                self.active = false;
                self.deleted = true;
            }
            CustomerEvent::InvoiceSettled { settlement, .. } => {
                self.loyalty_points = self
                    .loyalty_points
                    .saturating_sub(settlement.points_redeemed)
                    + settlement.points_earned;
                self.wallet_balance =
                    self.wallet_balance - settlement.wallet_debited + settlement.wallet_credited;
                self.invoice_count += 1;
                self.lifetime_spend += settlement.spend;
                self.settlements.push(settlement.clone());
            }
            CustomerEvent::InvoiceReversed { invoice_id, .. } => {
                if let Some(idx) = self
                    .settlements
                    .iter()
                    .position(|s| s.invoice_id == *invoice_id && !s.reversed)
                {
                    let s = self.settlements[idx].clone();
                    self.loyalty_points = (self.loyalty_points + s.points_redeemed)
                        .saturating_sub(s.points_earned);
                    self.wallet_balance = (self.wallet_balance + s.wallet_debited)
                        .saturating_sub_floor(s.wallet_credited);
                    self.invoice_count = self.invoice_count.saturating_sub(1);
                    self.lifetime_spend = self.lifetime_spend.saturating_sub_floor(s.spend);
                    self.settlements[idx].reversed = true;
                }
            }
            CustomerEvent::ReferralPointsAwarded { referee, points, .. } => {
                self.loyalty_points += points;
                self.rewarded_referees.push(*referee);
            }
            CustomerEvent::PointsRedeemedForReward { points, .. } => {
                self.loyalty_points = self.loyalty_points.saturating_sub(*points);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::Register(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateDetails {
                tenant_id,
                patch,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![CustomerEvent::DetailsUpdated {
                    details: self.merged(patch)?,
                    occurred_at: *occurred_at,
                }])
            }
            CustomerCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_active(*tenant_id)?;
                Ok(vec![CustomerEvent::Deactivated {
                    occurred_at: *occurred_at,
                }])
            }
            CustomerCommand::Activate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if self.active {
                    return Err(DomainError::invariant("customer already active"));
                }
                Ok(vec![CustomerEvent::Activated {
                    occurred_at: *occurred_at,
                }])
            }
            CustomerCommand::Delete {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![CustomerEvent::Deleted {
                    occurred_at: *occurred_at,
                }])
            }
            CustomerCommand::SettleInvoice(cmd) => self.handle_settle(cmd),
            CustomerCommand::ReverseInvoice {
                tenant_id,
                invoice_id,
                occurred_at,
            } => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                ensure_tenant(self.tenant_id, *tenant_id)?;
                match self.settlement_for(*invoice_id) {
                    Some(s) if !s.reversed => Ok(vec![CustomerEvent::InvoiceReversed {
                        invoice_id: *invoice_id,
                        occurred_at: *occurred_at,
                    }]),
                    _ => Ok(vec![]),
                }
            }
            CustomerCommand::AwardReferralPoints {
                tenant_id,
                referee,
                points,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if *referee == self.id {
                    return Err(DomainError::invariant("a customer cannot refer themselves"));
                }
                if *points == 0 || self.rewarded_referees.contains(referee) {
                    return Ok(vec![]);
                }
                Ok(vec![CustomerEvent::ReferralPointsAwarded {
                    referee: *referee,
                    points: *points,
                    occurred_at: *occurred_at,
                }])
            }
            CustomerCommand::RedeemPointsForReward {
                tenant_id,
                points,
                min_points,
                occurred_at,
            } => {
                self.ensure_active(*tenant_id)?;
                if *points == 0 || *points < *min_points {
                    return Err(DomainError::validation(format!(
                        "points must be at least {}",
                        (*min_points).max(1)
                    )));
                }
                if *points > self.loyalty_points {
                    return Err(DomainError::invariant(format!(
                        "insufficient loyalty points (balance {})",
                        self.loyalty_points
                    )));
                }
                Ok(vec![CustomerEvent::PointsRedeemedForReward {
                    points: *points,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl Customer {
    fn set_details(&mut self, d: &CustomerDetails) {
        self.name = d.name.clone();
        self.email = d.email.clone();
        self.phone = d.phone.clone();
        self.gender = d.gender;
        self.birthday = d.birthday;
        self.anniversary = d.anniversary;
        self.notes = d.notes.clone();
    }

    fn merged(&self, patch: &CustomerPatch) -> DomainResult<CustomerDetails> {
        let text = |v: &Option<String>, cur: &Option<String>| match v {
            Some(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            None => cur.clone(),
        };
        let details = CustomerDetails {
            name: patch
                .name
                .as_deref()
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| self.name.clone()),
            email: text(&patch.email, &self.email).map(|e| normalize_email(&e)),
            phone: text(&patch.phone, &self.phone),
            gender: patch.gender.or(self.gender),
            birthday: patch.birthday.or(self.birthday),
            anniversary: patch.anniversary.or(self.anniversary),
            notes: text(&patch.notes, &self.notes),
        };

        let mut v = Violations::new();
        v.require_non_empty(&details.name, "name");
        if let Some(email) = &details.email {
            v.check(is_valid_email(email), "email must be a valid email");
        }
        if let Some(phone) = &details.phone {
            v.check(
                phone.chars().filter(char::is_ascii_digit).count() >= 7
                    && phone
                        .chars()
                        .all(|c| c.is_ascii_digit() || " +-()".contains(c)),
                "phone must be a valid phone number",
            );
        }
        v.into_result()?;
        Ok(details)
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.referred_by == Some(self.id) {
            return Err(DomainError::invariant("a customer cannot refer themselves"));
        }
        if !is_referral_code(&cmd.referral_code) {
            return Err(DomainError::validation(
                "referral_code must be 8 uppercase letters or digits",
            ));
        }

        Ok(vec![CustomerEvent::Registered {
            tenant_id: cmd.tenant_id,
            customer_id: self.id,
            details: self.merged(&cmd.details)?,
            referral_code: cmd.referral_code.clone(),
            referred_by: cmd.referred_by,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_settle(&self, cmd: &SettleInvoice) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_active(cmd.tenant_id)?;
        if self.settlement_for(cmd.invoice_id).is_some() {
            return Err(DomainError::conflict("invoice already settled for customer"));
        }

        let mut v = Violations::new();
        v.check(!cmd.wallet_debited.is_negative(), "wallet_debited must not be negative");
        v.check(!cmd.wallet_credited.is_negative(), "wallet_credited must not be negative");
        v.check(!cmd.spend.is_negative(), "spend must not be negative");
        v.into_result()?;

        if cmd.points_redeemed > self.loyalty_points {
            return Err(DomainError::invariant(format!(
                "insufficient loyalty points (balance {})",
                self.loyalty_points
            )));
        }
        if cmd.wallet_debited > self.wallet_balance {
            return Err(DomainError::invariant(format!(
                "insufficient wallet balance ({})",
                self.wallet_balance
            )));
        }

        Ok(vec![CustomerEvent::InvoiceSettled {
            settlement: Settlement {
                invoice_id: cmd.invoice_id,
                points_redeemed: cmd.points_redeemed,
                points_earned: cmd.points_earned,
                wallet_debited: cmd.wallet_debited,
                wallet_credited: cmd.wallet_credited,
                spend: cmd.spend,
                reversed: false,
            },
            occurred_at: cmd.occurred_at,
        }])
    }
}

pub fn is_referral_code(code: &str) -> bool {
    code.len() == 8
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn register(tenant_id: TenantId, referred_by: Option<CustomerId>) -> Customer {
        let mut c = Customer::empty(CustomerId::generate());
        let events = c
            .handle(&CustomerCommand::Register(RegisterCustomer {
                tenant_id,
                details: CustomerPatch {
                    name: Some("Priya Shah".into()),
                    email: Some("Priya@Example.com".into()),
                    phone: Some("+91 98765 43210".into()),
                    ..CustomerPatch::default()
                },
                referral_code: "PRIYA123".into(),
                referred_by,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            c.apply(e);
        }
        c
    }

    fn run(c: &mut Customer, cmd: CustomerCommand) -> DomainResult<usize> {
        let events = c.handle(&cmd)?;
        for e in &events {
            c.apply(e);
        }
        Ok(events.len())
    }

    fn settle(tenant_id: TenantId, invoice_id: AggregateId, redeemed: u64, earned: u64) -> CustomerCommand {
        CustomerCommand::SettleInvoice(SettleInvoice {
            tenant_id,
            invoice_id,
            points_redeemed: redeemed,
            points_earned: earned,
            wallet_debited: Money::ZERO,
            wallet_credited: Money::from_minor(500),
            spend: Money::from_minor(20_000),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_normalizes_email_and_flags_referral() {
        let t = TenantId::new();
        let c = register(t, Some(CustomerId::generate()));
        assert_eq!(c.email.as_deref(), Some("priya@example.com"));
        assert!(c.is_referral_eligible());
    }

    #[test]
    fn settlement_then_reversal_restores_balances() {
        let t = TenantId::new();
        let mut c = register(t, None);
        let first = AggregateId::new();
        run(&mut c, settle(t, first, 0, 40)).unwrap();
        assert_eq!(c.loyalty_points, 40);

        let second = AggregateId::new();
        run(&mut c, settle(t, second, 30, 10)).unwrap();
        assert_eq!(c.loyalty_points, 20);
        assert_eq!(c.wallet_balance, Money::from_minor(1_000));
        assert_eq!(c.invoice_count, 2);

        run(
            &mut c,
            CustomerCommand::ReverseInvoice {
                tenant_id: t,
                invoice_id: second,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        assert_eq!(c.loyalty_points, 40);
        assert_eq!(c.wallet_balance, Money::from_minor(500));
        assert_eq!(c.invoice_count, 1);
        assert_eq!(c.lifetime_spend, Money::from_minor(20_000));

        // Second reversal is a no-op.
        let n = run(
            &mut c,
            CustomerCommand::ReverseInvoice {
                tenant_id: t,
                invoice_id: second,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn cannot_redeem_more_points_than_balance() {
        let t = TenantId::new();
        let mut c = register(t, None);
        let err = run(&mut c, settle(t, AggregateId::new(), 1, 0)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn same_invoice_cannot_settle_twice() {
        let t = TenantId::new();
        let mut c = register(t, None);
        let inv = AggregateId::new();
        run(&mut c, settle(t, inv, 0, 5)).unwrap();
        assert!(matches!(
            run(&mut c, settle(t, inv, 0, 5)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn referral_award_is_once_per_referee() {
        let t = TenantId::new();
        let mut c = register(t, None);
        let referee = CustomerId::generate();
        let award = |points| CustomerCommand::AwardReferralPoints {
            tenant_id: t,
            referee,
            points,
            occurred_at: Utc::now(),
        };
        assert_eq!(run(&mut c, award(50)).unwrap(), 1);
        assert_eq!(run(&mut c, award(50)).unwrap(), 0);
        assert_eq!(c.loyalty_points, 50);
    }

    #[test]
    fn self_referral_is_rejected() {
        let mut c = Customer::empty(CustomerId::generate());
        let own = c.id;
        let err = run(
            &mut c,
            CustomerCommand::Register(RegisterCustomer {
                tenant_id: TenantId::new(),
                details: CustomerPatch {
                    name: Some("Me".into()),
                    ..CustomerPatch::default()
                },
                referral_code: "ABCDEFGH".into(),
                referred_by: Some(own),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("refer themselves"));
    }

    #[test]
    fn reward_redemption_respects_minimum() {
        let t = TenantId::new();
        let mut c = register(t, None);
        run(&mut c, settle(t, AggregateId::new(), 0, 150)).unwrap();
        let redeem = |points| CustomerCommand::RedeemPointsForReward {
            tenant_id: t,
            points,
            min_points: 100,
            occurred_at: Utc::now(),
        };
        assert!(matches!(run(&mut c, redeem(50)), Err(DomainError::Validation(_))));
        assert!(matches!(run(&mut c, redeem(200)), Err(DomainError::InvariantViolation(_))));
        run(&mut c, redeem(120)).unwrap();
        assert_eq!(c.loyalty_points, 30);
    }

    proptest! {
        #[test]
        fn reversal_never_underflows(earned in 0u64..500, redeemed_later in 0u64..500) {
            let t = TenantId::new();
            let mut c = register(t, None);
            let inv = AggregateId::new();
            run(&mut c, settle(t, inv, 0, earned)).unwrap();
            let spend = redeemed_later.min(c.loyalty_points);
            if spend > 0 {
                run(&mut c, CustomerCommand::RedeemPointsForReward {
                    tenant_id: t,
                    points: spend,
                    min_points: 0,
                    occurred_at: Utc::now(),
                }).unwrap();
            }
            run(&mut c, CustomerCommand::ReverseInvoice {
                tenant_id: t,
                invoice_id: inv,
                occurred_at: Utc::now(),
            }).unwrap();
            prop_assert_eq!(c.loyalty_points, 0);
            prop_assert!(!c.wallet_balance.is_negative());
        }
    }
}
