use serde::{Deserialize, Serialize};

use spadesk_core::{TenantId, UserId};

use crate::{Permission, Role};

/// A principal's membership in a tenant: roles and the permissions they
/// resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn new(user_id: UserId, active_tenant_id: TenantId, membership: TenantMembership) -> Self {
        Self {
            user_id,
            active_tenant_id,
            membership,
        }
    }

    pub fn roles(&self) -> &[Role] {
        &self.membership.roles
    }
}
