//! Bookable spa services (massage, facial, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::Violations;
use spadesk_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, Rate, TenantId, ensure_tenant,
};
use spadesk_events::Event;

spadesk_core::typed_id!(ServiceId, "service id");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub category: Option<String>,
    pub duration_minutes: u32,
    pub price: Money,
    /// `None` falls back to the account's default tax rate.
    pub tax_rate: Option<Rate>,
    pub active: bool,
    pub deleted: bool,
    pub version: u64,
    pub created: bool,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub duration_minutes: Option<u32>,
    pub price: Option<Money>,
    pub tax_rate: Option<Rate>,
}

impl Service {
    pub fn empty(id: ServiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            category: None,
            duration_minutes: 0,
            price: Money::ZERO,
            tax_rate: None,
            active: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.deleted
    }

    /// Fails unless the service can go on an invoice.
    pub fn ensure_sellable(&self, tenant_id: TenantId) -> DomainResult<()> {
        self.ensure_live(tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("service '{}' is inactive", self.name)));
        }
        Ok(())
    }

    fn ensure_live(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.is_visible() {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }

    fn validated(&self, patch: &ServicePatch) -> DomainResult<Service> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(category) = &patch.category {
            next.category = Some(category.trim().to_string()).filter(|c| !c.is_empty());
        }
        if let Some(minutes) = patch.duration_minutes {
            next.duration_minutes = minutes;
        }
        if let Some(price) = patch.price {
            next.price = price;
        }
        if let Some(rate) = patch.tax_rate {
            next.tax_rate = Some(rate);
        }

        let mut v = Violations::new();
        v.require_non_empty(&next.name, "name");
        v.check(next.duration_minutes > 0, "duration_minutes must be positive");
        v.check(!next.price.is_negative(), "price must not be negative");
        v.check(
            next.tax_rate.is_none_or(|r| r <= Rate::HUNDRED_PERCENT),
            "tax_rate must not exceed 100%",
        );
        v.into_result()?;
        Ok(next)
    }
}

impl AggregateRoot for Service {
    type Id = ServiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceCommand {
    Create {
        tenant_id: TenantId,
        details: ServicePatch,
        occurred_at: DateTime<Utc>,
    },
    Update {
        tenant_id: TenantId,
        patch: ServicePatch,
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
}

/// Details carried by create/update events (the full post-change state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetails {
    pub name: String,
    pub category: Option<String>,
    pub duration_minutes: u32,
    pub price: Money,
    pub tax_rate: Option<Rate>,
}

impl From<&Service> for ServiceDetails {
    fn from(s: &Service) -> Self {
        Self {
            name: s.name.clone(),
            category: s.category.clone(),
            duration_minutes: s.duration_minutes,
            price: s.price,
            tax_rate: s.tax_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceEvent {
    Created {
        tenant_id: TenantId,
        service_id: ServiceId,
        details: ServiceDetails,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        details: ServiceDetails,
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
}

impl Event for ServiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::Created { .. } => "catalog.service.created",
            ServiceEvent::Updated { .. } => "catalog.service.updated",
            ServiceEvent::Deactivated { .. } => "catalog.service.deactivated",
            ServiceEvent::Activated { .. } => "catalog.service.activated",
            ServiceEvent::Deleted { .. } => "catalog.service.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ServiceEvent::Created { occurred_at, .. }
            | ServiceEvent::Updated { occurred_at, .. }
            | ServiceEvent::Deactivated { occurred_at }
            | ServiceEvent::Activated { occurred_at }
            | ServiceEvent::Deleted { occurred_at } => *occurred_at,
        }
    }
}

impl Aggregate for Service {
    type Command = ServiceCommand;
    type Event = ServiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let set = |s: &mut Service, d: &ServiceDetails| {
            s.name = d.name.clone();
            s.category = d.category.clone();
            s.duration_minutes = d.duration_minutes;
            s.price = d.price;
            s.tax_rate = d.tax_rate;
        };
        match event {
            ServiceEvent::Created {
                tenant_id,
                service_id,
                details,
                ..
            } => {
                self.id = *service_id;
                self.tenant_id = Some(*tenant_id);
                set(self, details);
                self.active = true;
                self.created = true;
            }
            ServiceEvent::Updated { details, .. } => set(self, details),
            ServiceEvent::Deactivated { .. } => self.active = false,
            ServiceEvent::Activated { .. } => self.active = true,
            ServiceEvent::Deleted { .. } => {
                self.active = false;
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ServiceCommand::Create {
                tenant_id,
                details,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("service already exists"));
                }
                let next = self.validated(details)?;
                Ok(vec![ServiceEvent::Created {
                    tenant_id: *tenant_id,
                    service_id: self.id,
                    details: ServiceDetails::from(&next),
                    occurred_at: *occurred_at,
                }])
            }
            ServiceCommand::Update {
                tenant_id,
                patch,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                let next = self.validated(patch)?;
                Ok(vec![ServiceEvent::Updated {
                    details: ServiceDetails::from(&next),
                    occurred_at: *occurred_at,
                }])
            }
            ServiceCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if !self.active {
                    return Err(DomainError::invariant("service already inactive"));
                }
                Ok(vec![ServiceEvent::Deactivated {
                    occurred_at: *occurred_at,
                }])
            }
            ServiceCommand::Activate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                if self.active {
                    return Err(DomainError::invariant("service already active"));
                }
                Ok(vec![ServiceEvent::Activated {
                    occurred_at: *occurred_at,
                }])
            }
            ServiceCommand::Delete {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![ServiceEvent::Deleted {
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn massage(tenant_id: TenantId) -> Service {
        let mut service = Service::empty(ServiceId::generate());
        let events = service
            .handle(&ServiceCommand::Create {
                tenant_id,
                details: ServicePatch {
                    name: Some("Swedish Massage".into()),
                    category: Some("Massage".into()),
                    duration_minutes: Some(60),
                    price: Some(Money::from_minor(250_000)),
                    tax_rate: None,
                },
                occurred_at: Utc::now(),
            })
            .unwrap();
        for e in &events {
            service.apply(e);
        }
        service
    }

    #[test]
    fn create_requires_name_and_duration() {
        let err = Service::empty(ServiceId::generate())
            .handle(&ServiceCommand::Create {
                tenant_id: TenantId::new(),
                details: ServicePatch::default(),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("name is required, duration_minutes must be positive".into())
        );
    }

    #[test]
    fn deleted_service_disappears_and_cannot_be_sold() {
        let t = TenantId::new();
        let mut service = massage(t);
        assert!(service.ensure_sellable(t).is_ok());

        for e in service
            .handle(&ServiceCommand::Delete {
                tenant_id: t,
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            service.apply(&e);
        }
        assert!(!service.is_visible());
        assert_eq!(service.ensure_sellable(t), Err(DomainError::NotFound));
        assert!(matches!(
            service.handle(&ServiceCommand::Activate {
                tenant_id: t,
                occurred_at: Utc::now()
            }),
            Err(DomainError::NotFound)
        ));
    }

    #[test]
    fn inactive_service_is_not_sellable() {
        let t = TenantId::new();
        let mut service = massage(t);
        for e in service
            .handle(&ServiceCommand::Deactivate {
                tenant_id: t,
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            service.apply(&e);
        }
        assert!(matches!(
            service.ensure_sellable(t),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn patch_changes_only_given_fields() {
        let t = TenantId::new();
        let mut service = massage(t);
        for e in service
            .handle(&ServiceCommand::Update {
                tenant_id: t,
                patch: ServicePatch {
                    price: Some(Money::from_minor(300_000)),
                    tax_rate: Some(Rate::from_bps(1800)),
                    ..ServicePatch::default()
                },
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            service.apply(&e);
        }
        assert_eq!(service.name, "Swedish Massage");
        assert_eq!(service.duration_minutes, 60);
        assert_eq!(service.price, Money::from_minor(300_000));
        assert_eq!(service.tax_rate, Some(Rate::from_bps(1800)));
    }
}
