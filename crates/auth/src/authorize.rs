use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// Pure policy check: no IO, no business rules.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, membership_for};
    use spadesk_core::{TenantId, UserId};

    #[test]
    fn wildcard_and_exact_match_allow() {
        let t = TenantId::new();
        let admin = Principal::new(UserId::new(), t, membership_for(t, &[Role::ADMIN]));
        let cashier = Principal::new(UserId::new(), t, membership_for(t, &[Role::CASHIER]));

        assert!(authorize(&admin, &Permission::USERS_MANAGE).is_ok());
        assert!(authorize(&cashier, &Permission::INVOICES_PAY).is_ok());
        assert_eq!(
            authorize(&cashier, &Permission::INVOICES_VOID),
            Err(AuthzError::Forbidden("invoices.void".into()))
        );
    }

    #[test]
    fn membership_of_another_tenant_is_rejected() {
        let admin = Principal::new(
            UserId::new(),
            TenantId::new(),
            membership_for(TenantId::new(), &[Role::ADMIN]),
        );
        assert_eq!(
            authorize(&admin, &Permission::ACCOUNT_READ),
            Err(AuthzError::TenantMismatch)
        );
    }
}
