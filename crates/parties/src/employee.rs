//! Staff who perform services and earn commission on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_accounts::OutletId;
use spadesk_core::validation::{Violations, is_valid_email, normalize_email};
use spadesk_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Rate, TenantId, ensure_tenant};
use spadesk_events::Event;

spadesk_core::typed_id!(EmployeeId, "employee id");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub outlets: Vec<OutletId>,
    pub commission_rate: Rate,
    pub active: bool,
    pub deleted: bool,
    pub version: u64,
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub outlets: Option<Vec<OutletId>>,
    pub commission_rate: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub outlets: Vec<OutletId>,
    pub commission_rate: Rate,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            email: None,
            phone: None,
            designation: None,
            outlets: Vec::new(),
            commission_rate: Rate::ZERO,
            active: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.deleted
    }

    /// Fails unless the employee can be credited on an invoice line.
    pub fn ensure_active(&self, tenant_id: TenantId) -> DomainResult<()> {
        self.ensure_live(tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("employee '{}' is inactive", self.name)));
        }
        Ok(())
    }

    fn ensure_live(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.is_visible() {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }

    fn merged(&self, patch: &EmployeePatch) -> DomainResult<EmployeeDetails> {
        let text = |v: &Option<String>, cur: &Option<String>| match v {
            Some(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            None => cur.clone(),
        };
        let mut outlets = patch.outlets.clone().unwrap_or_else(|| self.outlets.clone());
        outlets.sort();
        outlets.dedup();

        let details = EmployeeDetails {
            name: patch
                .name
                .as_deref()
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| self.name.clone()),
            email: text(&patch.email, &self.email).map(|e| normalize_email(&e)),
            phone: text(&patch.phone, &self.phone),
            designation: text(&patch.designation, &self.designation),
            outlets,
            commission_rate: patch.commission_rate.unwrap_or(self.commission_rate),
        };

        let mut v = Violations::new();
        v.require_non_empty(&details.name, "name");
        if let Some(email) = &details.email {
            v.check(is_valid_email(email), "email must be a valid email");
        }
        v.check(
            details.commission_rate <= Rate::HUNDRED_PERCENT,
            "commission_rate must not exceed 100%",
        );
        v.into_result()?;
        Ok(details)
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmployeeCommand {
    Register {
        tenant_id: TenantId,
        details: EmployeePatch,
        occurred_at: DateTime<Utc>,
    },
    Update {
        tenant_id: TenantId,
        patch: EmployeePatch,
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmployeeEvent {
    Registered {
        tenant_id: TenantId,
        employee_id: EmployeeId,
        details: EmployeeDetails,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        details: EmployeeDetails,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        occurred_at: DateTime<Utc>,
    },
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::Registered { .. } => "parties.employee.registered",
            EmployeeEvent::Updated { .. } => "parties.employee.updated",
            EmployeeEvent::Deactivated { .. } => "parties.employee.deactivated",
            EmployeeEvent::Deleted { .. } => "parties.employee.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::Registered { occurred_at, .. }
            | EmployeeEvent::Updated { occurred_at, .. }
            | EmployeeEvent::Deactivated { occurred_at }
            | EmployeeEvent::Deleted { occurred_at } => *occurred_at,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let set = |e: &mut Employee, d: &EmployeeDetails| {
            e.name = d.name.clone();
            e.email = d.email.clone();
            e.phone = d.phone.clone();
            e.designation = d.designation.clone();
            e.outlets = d.outlets.clone();
            e.commission_rate = d.commission_rate;
        };
        match event {
            EmployeeEvent::Registered {
                tenant_id,
                employee_id,
                details,
                ..
            } => {
                self.id = *employee_id;
                self.tenant_id = Some(*tenant_id);
                set(self, details);
                self.active = true;
                self.created = true;
            }
            EmployeeEvent::Updated { details, .. } => set(self, details),
            EmployeeEvent::Deactivated { .. } => self.active = false,
            EmployeeEvent::Deleted { .. } => {
                self.active = false;
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::Register {
                tenant_id,
                details,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("employee already exists"));
                }
                Ok(vec![EmployeeEvent::Registered {
                    tenant_id: *tenant_id,
                    employee_id: self.id,
                    details: self.merged(details)?,
                    occurred_at: *occurred_at,
                }])
            }
            EmployeeCommand::Update {
                tenant_id,
                patch,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![EmployeeEvent::Updated {
                    details: self.merged(patch)?,
                    occurred_at: *occurred_at,
                }])
            }
            EmployeeCommand::Deactivate {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_active(*tenant_id)?;
                Ok(vec![EmployeeEvent::Deactivated {
                    occurred_at: *occurred_at,
                }])
            }
            EmployeeCommand::Delete {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_live(*tenant_id)?;
                Ok(vec![EmployeeEvent::Deleted {
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}
