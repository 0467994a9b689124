//! Staff user aggregate (login identity within one tenant).
//!
//! The password hash is opaque here; hashing and verification live in
//! [`crate::password`]. Global e-mail uniqueness is enforced by the
//! credential index in infra, not by this aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{Violations, normalize_email};
use spadesk_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId, ensure_tenant};
use spadesk_events::Event;

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - A user belongs to exactly one tenant.
/// - Only known roles can be granted, and only by an actor who holds the
///   role themselves or is an admin.
/// - Deactivated users cannot log in or be modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            tenant_id: None,
            email: String::new(),
            display_name: String::new(),
            password_hash: String::new(),
            roles: Vec::new(),
            active: false,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn can_log_in(&self) -> bool {
        self.created && self.active
    }

    fn ensure_live(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant("user is deactivated"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub tenant_id: TenantId,
    pub role: Role,
    /// Roles of the actor performing the change (escalation check).
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub tenant_id: TenantId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePassword {
    pub tenant_id: TenantId,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateUser {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    ChangePassword(ChangePassword),
    Deactivate(DeactivateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChanged {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeactivated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleAssigned(RoleChanged),
    RoleRevoked(RoleChanged),
    PasswordChanged(PasswordChanged),
    Deactivated(UserDeactivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::PasswordChanged(_) => "auth.user.password_changed",
            UserEvent::Deactivated(_) => "auth.user.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) | UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::PasswordChanged(e) => e.occurred_at,
            UserEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.password_hash = e.password_hash.clone();
                self.roles = e.roles.clone();
                self.active = true;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            UserEvent::RoleAssigned(e) => self.roles.push(e.role.clone()),
            UserEvent::RoleRevoked(e) => self.roles.retain(|r| r != &e.role),
            UserEvent::PasswordChanged(e) => self.password_hash = e.password_hash.clone(),
            UserEvent::Deactivated(_) => self.active = false,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::ChangePassword(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                if cmd.password_hash.is_empty() {
                    return Err(DomainError::validation("password is required"));
                }
                Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
                    tenant_id: cmd.tenant_id,
                    user_id: self.id,
                    password_hash: cmd.password_hash.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::Deactivate(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![UserEvent::Deactivated(UserDeactivated {
                    tenant_id: cmd.tenant_id,
                    user_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        let mut v = Violations::new();
        v.require_email(&cmd.email, "email");
        v.require_non_empty(&cmd.display_name, "display_name");
        v.check(!cmd.password_hash.is_empty(), "password is required");
        v.check(!cmd.roles.is_empty(), "at least one role is required");
        for role in cmd.roles.iter().filter(|r| !r.is_known()) {
            v.push(format!("unknown role '{role}'"));
        }
        v.into_result()?;

        let mut roles = cmd.roles.clone();
        roles.dedup();

        Ok(vec![UserEvent::Created(UserCreated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email: normalize_email(&cmd.email),
            display_name: cmd.display_name.trim().to_string(),
            password_hash: cmd.password_hash.clone(),
            roles,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id)?;

        if !cmd.role.is_known() {
            return Err(DomainError::validation(format!("unknown role '{}'", cmd.role)));
        }
        if self.roles.contains(&cmd.role) {
            return Err(DomainError::invariant("role already assigned"));
        }

        // Privilege escalation: only admins or holders of the role may grant it.
        let actor_is_admin = cmd.actor_roles.contains(&Role::ADMIN);
        if !actor_is_admin && !cmd.actor_roles.contains(&cmd.role) {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleChanged {
            tenant_id: cmd.tenant_id,
            user_id: self.id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id)?;

        if !self.roles.contains(&cmd.role) {
            return Err(DomainError::invariant("role not assigned"));
        }
        if self.roles.len() == 1 {
            return Err(DomainError::invariant("a user must keep at least one role"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleChanged {
            tenant_id: cmd.tenant_id,
            user_id: self.id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(tenant_id: TenantId, roles: Vec<Role>) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        let cmd = UserCommand::Create(CreateUser {
            tenant_id,
            user_id,
            email: " Alice@Example.com ".to_string(),
            display_name: "Alice".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            roles,
            occurred_at: Utc::now(),
        });
        for e in user.handle(&cmd).unwrap() {
            user.apply(&e);
        }
        user
    }

    #[test]
    fn create_normalizes_email_and_activates() {
        let user = created(TenantId::new(), vec![Role::CASHIER]);
        assert_eq!(user.email, "alice@example.com");
        assert!(user.can_log_in());
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_reports_every_violation() {
        let user = User::empty(UserId::new());
        let err = user
            .handle(&UserCommand::Create(CreateUser {
                tenant_id: TenantId::new(),
                user_id: user.id,
                email: "nope".into(),
                display_name: " ".into(),
                password_hash: "x".into(),
                roles: vec![Role::new("overlord")],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation(
                "email must be a valid email, display_name is required, unknown role 'overlord'"
                    .into()
            )
        );
    }

    #[test]
    fn non_admin_cannot_grant_a_role_they_lack() {
        let t = TenantId::new();
        let user = created(t, vec![Role::VIEWER]);
        let err = user
            .handle(&UserCommand::AssignRole(AssignRole {
                tenant_id: t,
                role: Role::ADMIN,
                actor_roles: vec![Role::MANAGER],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn admin_grants_and_revokes() {
        let t = TenantId::new();
        let mut user = created(t, vec![Role::VIEWER]);
        for e in user
            .handle(&UserCommand::AssignRole(AssignRole {
                tenant_id: t,
                role: Role::MANAGER,
                actor_roles: vec![Role::ADMIN],
                occurred_at: Utc::now(),
            }))
            .unwrap()
        {
            user.apply(&e);
        }
        assert_eq!(user.roles, vec![Role::VIEWER, Role::MANAGER]);

        for e in user
            .handle(&UserCommand::RevokeRole(RevokeRole {
                tenant_id: t,
                role: Role::VIEWER,
                occurred_at: Utc::now(),
            }))
            .unwrap()
        {
            user.apply(&e);
        }
        assert_eq!(user.roles, vec![Role::MANAGER]);
    }

    #[test]
    fn last_role_cannot_be_revoked() {
        let t = TenantId::new();
        let user = created(t, vec![Role::CASHIER]);
        let err = user
            .handle(&UserCommand::RevokeRole(RevokeRole {
                tenant_id: t,
                role: Role::CASHIER,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deactivated_user_cannot_log_in_or_change() {
        let t = TenantId::new();
        let mut user = created(t, vec![Role::CASHIER]);
        for e in user
            .handle(&UserCommand::Deactivate(DeactivateUser {
                tenant_id: t,
                occurred_at: Utc::now(),
            }))
            .unwrap()
        {
            user.apply(&e);
        }
        assert!(!user.can_log_in());

        let err = user
            .handle(&UserCommand::ChangePassword(ChangePassword {
                tenant_id: t,
                password_hash: "new".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("deactivated"));
    }

    #[test]
    fn other_tenant_is_rejected() {
        let user = created(TenantId::new(), vec![Role::CASHIER]);
        let err = user
            .handle(&UserCommand::Deactivate(DeactivateUser {
                tenant_id: TenantId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("tenant"));
    }
}
