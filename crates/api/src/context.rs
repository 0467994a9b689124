use spadesk_auth::Role;
use spadesk_core::{TenantId, UserId};
use uuid::Uuid;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated user, roles and the login
/// session the token belongs to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
    session_id: Uuid,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>, session_id: Uuid) -> Self {
        Self {
            user_id,
            roles,
            session_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
