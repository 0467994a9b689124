//! API-side authorization guard.
//!
//! Handlers call [`require`] before touching the backoffice, so aggregates
//! and infra stay auth-agnostic.

use spadesk_auth::{AuthzError, Permission, Principal, authorize, membership_for};

use crate::context::{PrincipalContext, TenantContext};

/// Check that the caller holds `permission` in the current tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    let membership = membership_for(tenant.tenant_id(), principal.roles());
    let principal = Principal::new(principal.user_id(), tenant.tenant_id(), membership);
    authorize(&principal, permission)
}

#[cfg(test)]
mod tests {
    use spadesk_auth::Role;
    use spadesk_core::{TenantId, UserId};
    use uuid::Uuid;

    use super::*;

    fn principal(roles: Vec<Role>) -> PrincipalContext {
        PrincipalContext::new(UserId::new(), roles, Uuid::now_v7())
    }

    #[test]
    fn cashier_can_sell_but_not_manage_catalog() {
        let tenant = TenantContext::new(TenantId::new());
        let cashier = principal(vec![Role::CASHIER]);

        assert!(require(&tenant, &cashier, &Permission::INVOICES_CREATE).is_ok());
        assert!(require(&tenant, &cashier, &Permission::CATALOG_READ).is_ok());
        assert!(matches!(
            require(&tenant, &cashier, &Permission::CATALOG_MANAGE),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn only_admins_manage_the_account() {
        let tenant = TenantContext::new(TenantId::new());
        assert!(require(&tenant, &principal(vec![Role::ADMIN]), &Permission::ACCOUNT_MANAGE).is_ok());
        assert!(require(&tenant, &principal(vec![Role::MANAGER]), &Permission::ACCOUNT_MANAGE).is_err());
        assert!(require(&tenant, &principal(vec![Role::new("auditor")]), &Permission::REPORTS_READ).is_err());
    }
}
