//! Physical store / branch. Invoices and stock movements are per outlet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{Violations, is_code};
use spadesk_core::{Aggregate, AggregateRoot, DomainError, TenantId, ensure_tenant};
use spadesk_events::Event;

spadesk_core::typed_id!(OutletId, "outlet id");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlet {
    pub id: OutletId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    /// Short uppercase code embedded in invoice numbers; immutable.
    pub code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    pub version: u64,
    pub created: bool,
}

impl Outlet {
    pub fn empty(id: OutletId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            code: String::new(),
            address: None,
            phone: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    /// Fails unless the outlet exists, belongs to `tenant_id` and is active.
    pub fn ensure_active(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        self.ensure_exists(tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("outlet {} is inactive", self.code)));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }
}

impl AggregateRoot for Outlet {
    type Id = OutletId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutletCommand {
    Create {
        tenant_id: TenantId,
        name: String,
        code: String,
        address: Option<String>,
        phone: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Update {
        tenant_id: TenantId,
        name: Option<String>,
        address: Option<String>,
        phone: Option<String>,
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutletEvent {
    Created {
        tenant_id: TenantId,
        outlet_id: OutletId,
        name: String,
        code: String,
        address: Option<String>,
        phone: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        name: String,
        address: Option<String>,
        phone: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        occurred_at: DateTime<Utc>,
    },
    Activated {
        occurred_at: DateTime<Utc>,
    },
}

impl Event for OutletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OutletEvent::Created { .. } => "accounts.outlet.created",
            OutletEvent::Updated { .. } => "accounts.outlet.updated",
            OutletEvent::Deactivated { .. } => "accounts.outlet.deactivated",
            OutletEvent::Activated { .. } => "accounts.outlet.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OutletEvent::Created { occurred_at, .. }
            | OutletEvent::Updated { occurred_at, .. }
            | OutletEvent::Deactivated { occurred_at }
            | OutletEvent::Activated { occurred_at } => *occurred_at,
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Aggregate for Outlet {
    type Command = OutletCommand;
    type Event = OutletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OutletEvent::Created {
                tenant_id,
                outlet_id,
                name,
                code,
                address,
                phone,
                ..
            } => {
                self.id = *outlet_id;
                self.tenant_id = Some(*tenant_id);
                self.name = name.clone();
                self.code = code.clone();
                self.address = address.clone();
                self.phone = phone.clone();
                self.active = true;
                self.created = true;
            }
            OutletEvent::Updated {
                name,
                address,
                phone,
                ..
            } => {
                self.name = name.clone();
                self.address = address.clone();
                self.phone = phone.clone();
            }
            OutletEvent::Deactivated { .. } => self.active = false,
            OutletEvent::Activated { .. } => self.active = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OutletCommand::Create {
                tenant_id,
                name,
                code,
                address,
                phone,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("outlet already exists"));
                }
                let code = code.trim().to_ascii_uppercase();
                let mut v = Violations::new();
                v.require_non_empty(name, "name");
                v.check(
                    is_code(&code, 2, 8) && !code.contains('-'),
                    "code must be 2-8 uppercase letters or digits",
                );
                v.into_result()?;
                Ok(vec![OutletEvent::Created {
                    tenant_id: *tenant_id,
                    outlet_id: self.id,
                    name: name.trim().to_string(),
                    code,
                    address: trimmed(address),
                    phone: trimmed(phone),
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Update {
                tenant_id,
                name,
                address,
                phone,
                occurred_at,
            } => {
                self.ensure_exists(*tenant_id)?;
                let name = name.as_deref().unwrap_or(&self.name).trim().to_string();
                if name.is_empty() {
                    return Err(DomainError::validation("name is required"));
                }
                Ok(vec![OutletEvent::Updated {
                    name,
                    address: if address.is_some() { trimmed(address) } else { self.address.clone() },
                    phone: if phone.is_some() { trimmed(phone) } else { self.phone.clone() },
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_active(*tenant_id)?;
                Ok(vec![OutletEvent::Deactivated {
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Activate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_exists(*tenant_id)?;
                if self.active {
                    return Err(DomainError::invariant("outlet already active"));
                }
                Ok(vec![OutletEvent::Activated {
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(tenant_id: TenantId, code: &str) -> Result<Outlet, DomainError> {
        let mut outlet = Outlet::empty(OutletId::generate());
        let events = outlet.handle(&OutletCommand::Create {
            tenant_id,
            name: "Downtown".into(),
            code: code.into(),
            address: Some("  12 High St ".into()),
            phone: None,
            occurred_at: Utc::now(),
        })?;
        for e in &events {
            outlet.apply(e);
        }
        Ok(outlet)
    }

    #[test]
    fn code_is_uppercased_and_checked() {
        let tenant = TenantId::new();
        let outlet = create(tenant, "dt1").unwrap();
        assert_eq!(outlet.code, "DT1");
        assert_eq!(outlet.address.as_deref(), Some("12 High St"));
        assert!(outlet.ensure_active(tenant).is_ok());

        assert!(matches!(create(tenant, "D"), Err(DomainError::Validation(_))));
        assert!(matches!(create(tenant, "DT-1"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn deactivated_outlet_fails_active_check() {
        let tenant = TenantId::new();
        let mut outlet = create(tenant, "MAIN").unwrap();
        for e in outlet
            .handle(&OutletCommand::Deactivate {
                tenant_id: tenant,
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            outlet.apply(&e);
        }
        let err = outlet.ensure_active(tenant).unwrap_err();
        assert_eq!(err, DomainError::invariant("outlet MAIN is inactive"));

        for e in outlet
            .handle(&OutletCommand::Activate {
                tenant_id: tenant,
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            outlet.apply(&e);
        }
        assert!(outlet.active);
        assert_eq!(outlet.version, 3);
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let tenant = TenantId::new();
        let mut outlet = create(tenant, "MAIN").unwrap();
        for e in outlet
            .handle(&OutletCommand::Update {
                tenant_id: tenant,
                name: None,
                address: None,
                phone: Some("555-0100".into()),
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            outlet.apply(&e);
        }
        assert_eq!(outlet.name, "Downtown");
        assert_eq!(outlet.address.as_deref(), Some("12 High St"));
        assert_eq!(outlet.phone.as_deref(), Some("555-0100"));
    }
}
