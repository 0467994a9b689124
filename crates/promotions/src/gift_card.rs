//! Stored-value gift cards.
//!
//! Each redemption is recorded against its invoice so that voiding the
//! invoice refunds exactly what it took.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::is_code;
use spadesk_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, TenantId,
    ensure_tenant,
};
use spadesk_events::Event;
use spadesk_parties::CustomerId;

use crate::coupon::normalize_code;

spadesk_core::typed_id!(GiftCardId, "gift card id");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCardRedemption {
    pub invoice_id: AggregateId,
    pub amount: Money,
    pub refunded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCard {
    id: GiftCardId,
    tenant_id: Option<TenantId>,
    code: String,
    initial_value: Money,
    balance: Money,
    owner: Option<CustomerId>,
    expires_at: DateTime<Utc>,
    active: bool,
    redemptions: Vec<GiftCardRedemption>,
    issued_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl GiftCard {
    pub fn empty(id: GiftCardId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            initial_value: Money::ZERO,
            balance: Money::ZERO,
            owner: None,
            expires_at: DateTime::<Utc>::MIN_UTC,
            active: false,
            redemptions: Vec::new(),
            issued_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GiftCardId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn initial_value(&self) -> Money {
        self.initial_value
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn owner(&self) -> Option<CustomerId> {
        self.owner
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn redemptions(&self) -> &[GiftCardRedemption] {
        &self.redemptions
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Fails unless the card can be spent at `now`.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if !self.active {
            return Err(DomainError::invariant(format!("gift card {} is inactive", self.code)));
        }
        if self.is_expired(now) {
            return Err(DomainError::invariant(format!("gift card {} has expired", self.code)));
        }
        Ok(())
    }

    fn open_redemption(&self, invoice_id: AggregateId) -> Option<&GiftCardRedemption> {
        self.redemptions
            .iter()
            .find(|r| r.invoice_id == invoice_id && !r.refunded)
    }
}

impl AggregateRoot for GiftCard {
    type Id = GiftCardId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GiftCardCommand {
    Issue {
        tenant_id: TenantId,
        code: String,
        initial_value: Money,
        owner: Option<CustomerId>,
        expires_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    Redeem {
        tenant_id: TenantId,
        invoice_id: AggregateId,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
    Refund {
        tenant_id: TenantId,
        invoice_id: AggregateId,
        occurred_at: DateTime<Utc>,
    },
    TopUp {
        tenant_id: TenantId,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
    Deactivate {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GiftCardEvent {
    Issued {
        tenant_id: TenantId,
        gift_card_id: GiftCardId,
        code: String,
        initial_value: Money,
        owner: Option<CustomerId>,
        expires_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    Redeemed {
        invoice_id: AggregateId,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
    Refunded {
        invoice_id: AggregateId,
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
    ToppedUp {
        amount: Money,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        occurred_at: DateTime<Utc>,
    },
}

impl Event for GiftCardEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GiftCardEvent::Issued { .. } => "promotions.gift_card.issued",
            GiftCardEvent::Redeemed { .. } => "promotions.gift_card.redeemed",
            GiftCardEvent::Refunded { .. } => "promotions.gift_card.refunded",
            GiftCardEvent::ToppedUp { .. } => "promotions.gift_card.topped_up",
            GiftCardEvent::Deactivated { .. } => "promotions.gift_card.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GiftCardEvent::Issued { occurred_at, .. }
            | GiftCardEvent::Redeemed { occurred_at, .. }
            | GiftCardEvent::Refunded { occurred_at, .. }
            | GiftCardEvent::ToppedUp { occurred_at, .. }
            | GiftCardEvent::Deactivated { occurred_at } => *occurred_at,
        }
    }
}

impl Aggregate for GiftCard {
    type Command = GiftCardCommand;
    type Event = GiftCardEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GiftCardEvent::Issued {
                tenant_id,
                gift_card_id,
                code,
                initial_value,
                owner,
                expires_at,
                occurred_at,
            } => {
                self.id = *gift_card_id;
                self.tenant_id = Some(*tenant_id);
                self.code = code.clone();
                self.initial_value = *initial_value;
                self.balance = *initial_value;
                self.owner = *owner;
                self.expires_at = *expires_at;
                self.active = true;
                self.issued_at = Some(*occurred_at);
                self.created = true;
            }
            GiftCardEvent::Redeemed {
                invoice_id, amount, ..
            } => {
                self.balance = self.balance.saturating_sub_floor(*amount);
                self.redemptions.push(GiftCardRedemption {
                    invoice_id: *invoice_id,
                    amount: *amount,
                    refunded: false,
                });
            }
            GiftCardEvent::Refunded {
                invoice_id, amount, ..
            } => {
                if let Some(r) = self
                    .redemptions
                    .iter_mut()
                    .find(|r| r.invoice_id == *invoice_id && !r.refunded)
                {
                    r.refunded = true;
                    self.balance += *amount;
                }
            }
            GiftCardEvent::ToppedUp { amount, .. } => self.balance += *amount,
            GiftCardEvent::Deactivated { .. } => self.active = false,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GiftCardCommand::Issue {
                tenant_id,
                code,
                initial_value,
                owner,
                expires_at,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("gift card already exists"));
                }
                let code = normalize_code(code);
                if !is_code(&code, 3, 20) {
                    return Err(DomainError::validation(
                        "code must be 3-20 characters of A-Z, 0-9 or '-'",
                    ));
                }
                initial_value.ensure_positive("initial_value")?;
                if expires_at <= occurred_at {
                    return Err(DomainError::validation("expires_at must be in the future"));
                }
                Ok(vec![GiftCardEvent::Issued {
                    tenant_id: *tenant_id,
                    gift_card_id: self.id,
                    code,
                    initial_value: *initial_value,
                    owner: *owner,
                    expires_at: *expires_at,
                    occurred_at: *occurred_at,
                }])
            }
            GiftCardCommand::Redeem {
                tenant_id,
                invoice_id,
                amount,
                occurred_at,
            } => {
                ensure_tenant(self.tenant_id, *tenant_id)?;
                self.ensure_usable(*occurred_at)?;
                amount.ensure_positive("amount")?;
                if *amount > self.balance {
                    return Err(DomainError::invariant(format!(
                        "gift card {} balance {} is less than {}",
                        self.code, self.balance, amount
                    )));
                }
                if self.open_redemption(*invoice_id).is_some() {
                    return Err(DomainError::conflict("gift card already redeemed on this invoice"));
                }
                Ok(vec![GiftCardEvent::Redeemed {
                    invoice_id: *invoice_id,
                    amount: *amount,
                    occurred_at: *occurred_at,
                }])
            }
            GiftCardCommand::Refund {
                tenant_id,
                invoice_id,
                occurred_at,
            } => {
                ensure_tenant(self.tenant_id, *tenant_id)?;
                Ok(self
                    .open_redemption(*invoice_id)
                    .map(|r| GiftCardEvent::Refunded {
                        invoice_id: *invoice_id,
                        amount: r.amount,
                        occurred_at: *occurred_at,
                    })
                    .into_iter()
                    .collect())
            }
            GiftCardCommand::TopUp {
                tenant_id,
                amount,
                occurred_at,
            } => {
                ensure_tenant(self.tenant_id, *tenant_id)?;
                self.ensure_usable(*occurred_at)?;
                amount.ensure_positive("amount")?;
                Ok(vec![GiftCardEvent::ToppedUp {
                    amount: *amount,
                    occurred_at: *occurred_at,
                }])
            }
            GiftCardCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                ensure_tenant(self.tenant_id, *tenant_id)?;
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                if !self.active {
                    return Err(DomainError::invariant("gift card already inactive"));
                }
                Ok(vec![GiftCardEvent::Deactivated {
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

    fn execute(card: &mut GiftCard, cmd: GiftCardCommand) -> DomainResult<usize> {
        let events = card.handle(&cmd)?;
        for e in &events {
            card.apply(e);
        }
        Ok(events.len())
    }

    fn issued(tenant_id: TenantId, value: i64) -> GiftCard {
        let mut card = GiftCard::empty(GiftCardId::generate());
        execute(
            &mut card,
            GiftCardCommand::Issue {
                tenant_id,
                code: "gift-001".into(),
                initial_value: Money::from_minor(value),
                owner: None,
                expires_at: Utc::now() + Duration::days(365),
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        card
    }

    fn redeem(card: &mut GiftCard, tenant_id: TenantId, amount: i64) -> DomainResult<AggregateId> {
        let invoice_id = AggregateId::new();
        execute(
            card,
            GiftCardCommand::Redeem {
                tenant_id,
                invoice_id,
                amount: Money::from_minor(amount),
                occurred_at: Utc::now(),
            },
        )?;
        Ok(invoice_id)
    }

    #[test]
    fn redeem_and_refund_exactly_once() {
        let tenant = TenantId::new();
        let mut card = issued(tenant, 10_000);
        assert_eq!(card.code(), "GIFT-001");

        let invoice = redeem(&mut card, tenant, 3_000).unwrap();
        assert_eq!(card.balance(), Money::from_minor(7_000));

        let refund = GiftCardCommand::Refund {
            tenant_id: tenant,
            invoice_id: invoice,
            occurred_at: Utc::now(),
        };
        assert_eq!(execute(&mut card, refund.clone()).unwrap(), 1);
        assert_eq!(execute(&mut card, refund).unwrap(), 0);
        assert_eq!(card.balance(), Money::from_minor(10_000));
    }

    #[test]
    fn cannot_overdraw() {
        let tenant = TenantId::new();
        let mut card = issued(tenant, 1_000);
        assert!(matches!(
            redeem(&mut card, tenant, 1_001),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(card.balance(), Money::from_minor(1_000));
    }

    #[test]
    fn expired_or_inactive_cards_are_unusable() {
        let tenant = TenantId::new();
        let mut card = issued(tenant, 1_000);
        assert!(card.ensure_usable(card.expires_at()).is_err());

        execute(
            &mut card,
            GiftCardCommand::Deactivate {
                tenant_id: tenant,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        assert!(redeem(&mut card, tenant, 10).is_err());
        assert!(
            execute(
                &mut card,
                GiftCardCommand::TopUp {
                    tenant_id: tenant,
                    amount: Money::from_minor(10),
                    occurred_at: Utc::now(),
                },
            )
            .is_err()
        );
    }

    #[test]
    fn other_tenant_is_rejected() {
        let mut card = issued(TenantId::new(), 1_000);
        assert!(redeem(&mut card, TenantId::new(), 10).is_err());
    }
}
