//! Suppliers that purchase orders are raised against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{is_valid_email, normalize_email};
use spadesk_core::{Aggregate, AggregateRoot, DomainError, TenantId, ensure_tenant};
use spadesk_events::Event;

spadesk_core::typed_id!(
    /// Vendor identifier (tenant-scoped via `tenant_id` fields in events/commands).
    VendorId,
    "vendor id"
);

/// Vendor status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorStatus {
    Active,
    Suspended,
}

/// Contact information for a vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    fn normalized(&self) -> Result<Self, DomainError> {
        let clean = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let email = clean(&self.email).map(|e| normalize_email(&e));
        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err(DomainError::validation("email must be a valid email"));
        }
        Ok(Self {
            contact_person: clean(&self.contact_person),
            email,
            phone: clean(&self.phone),
            address: clean(&self.address),
        })
    }
}

/// Aggregate root: Vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    id: VendorId,
    tenant_id: Option<TenantId>,
    name: String,
    contact: ContactInfo,
    status: VendorStatus,
    suspension_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Vendor {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: VendorId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            contact: ContactInfo::default(),
            status: VendorStatus::Active,
            suspension_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VendorId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> VendorStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Suspended vendors cannot receive new purchase orders.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == VendorStatus::Active
    }
}

impl AggregateRoot for Vendor {
    type Id = VendorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterVendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVendor {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendVendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendVendor {
    pub tenant_id: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorCommand {
    Register(RegisterVendor),
    UpdateDetails(UpdateDetails),
    Suspend(SuspendVendor),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRegistered {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorUpdated {
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSuspended {
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorEvent {
    Registered(VendorRegistered),
    Updated(VendorUpdated),
    Suspended(VendorSuspended),
}

impl Event for VendorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VendorEvent::Registered(_) => "parties.vendor.registered",
            VendorEvent::Updated(_) => "parties.vendor.updated",
            VendorEvent::Suspended(_) => "parties.vendor.suspended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VendorEvent::Registered(e) => e.occurred_at,
            VendorEvent::Updated(e) => e.occurred_at,
            VendorEvent::Suspended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Vendor {
    type Command = VendorCommand;
    type Event = VendorEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VendorEvent::Registered(e) => {
                self.id = e.vendor_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = VendorStatus::Active;
                self.created = true;
            }
            VendorEvent::Updated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            VendorEvent::Suspended(e) => {
                self.status = VendorStatus::Suspended;
                self.suspension_reason = e.reason.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VendorCommand::Register(cmd) => self.handle_register(cmd),
            VendorCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            VendorCommand::Suspend(cmd) => self.handle_suspend(cmd),
        }
    }
}

impl Vendor {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }

    fn handle_register(&self, cmd: &RegisterVendor) -> Result<Vec<VendorEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("vendor already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name is required"));
        }

        let contact = cmd.contact.clone().unwrap_or_default().normalized()?;

        Ok(vec![VendorEvent::Registered(VendorRegistered {
            tenant_id: cmd.tenant_id,
            vendor_id: cmd.vendor_id,
            name: cmd.name.trim().to_string(),
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<VendorEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name is required"));
        }

        let new_contact = match &cmd.contact {
            Some(c) => c.normalized()?,
            None => self.contact.clone(),
        };

        Ok(vec![VendorEvent::Updated(VendorUpdated {
            name: new_name.trim().to_string(),
            contact: new_contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendVendor) -> Result<Vec<VendorEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        if self.status == VendorStatus::Suspended {
            return Err(DomainError::conflict("vendor is already suspended"));
        }

        Ok(vec![VendorEvent::Suspended(VendorSuspended {
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
