//! Static role → permission mapping.

use spadesk_core::TenantId;

use crate::{Permission, Role, TenantMembership};

/// Permissions granted by a single role. Unknown roles grant nothing.
pub fn permissions_for(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::WILDCARD],
        "manager" => Permission::ALL
            .iter()
            .filter(|p| **p != Permission::USERS_MANAGE && **p != Permission::ACCOUNT_MANAGE)
            .cloned()
            .collect(),
        "cashier" => {
            let mut perms: Vec<Permission> =
                Permission::ALL.iter().filter(|p| p.is_read()).cloned().collect();
            perms.extend([
                Permission::INVOICES_CREATE,
                Permission::INVOICES_PAY,
                Permission::CUSTOMERS_CREATE,
                Permission::CUSTOMERS_UPDATE,
                Permission::GIFT_CARDS_ISSUE,
                Permission::REWARDS_REDEEM,
            ]);
            perms
        }
        "viewer" => Permission::ALL.iter().filter(|p| p.is_read()).cloned().collect(),
        _ => Vec::new(),
    }
}

/// Resolve the membership of a principal holding `roles` in `tenant_id`.
pub fn membership_for(tenant_id: TenantId, roles: &[Role]) -> TenantMembership {
    let mut permissions: Vec<Permission> = roles.iter().flat_map(permissions_for).collect();
    permissions.sort();
    permissions.dedup();
    TenantMembership {
        tenant_id,
        roles: roles.to_vec(),
        permissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(role: &Role, perm: &Permission) -> bool {
        let perms = permissions_for(role);
        perms.contains(&Permission::WILDCARD) || perms.contains(perm)
    }

    #[test]
    fn admin_is_wildcard() {
        assert_eq!(permissions_for(&Role::ADMIN), vec![Permission::WILDCARD]);
    }

    #[test]
    fn manager_cannot_manage_users_or_account() {
        assert!(grants(&Role::MANAGER, &Permission::INVOICES_VOID));
        assert!(grants(&Role::MANAGER, &Permission::CATALOG_MANAGE));
        assert!(!grants(&Role::MANAGER, &Permission::USERS_MANAGE));
        assert!(!grants(&Role::MANAGER, &Permission::ACCOUNT_MANAGE));
    }

    #[test]
    fn cashier_sells_but_does_not_void() {
        assert!(grants(&Role::CASHIER, &Permission::INVOICES_CREATE));
        assert!(grants(&Role::CASHIER, &Permission::REPORTS_READ));
        assert!(grants(&Role::CASHIER, &Permission::REWARDS_REDEEM));
        assert!(!grants(&Role::CASHIER, &Permission::INVOICES_VOID));
        assert!(!grants(&Role::CASHIER, &Permission::CATALOG_MANAGE));
    }

    #[test]
    fn viewer_only_reads_and_unknown_gets_nothing() {
        assert!(permissions_for(&Role::VIEWER).iter().all(Permission::is_read));
        assert!(permissions_for(&Role::new("janitor")).is_empty());
    }

    #[test]
    fn membership_merges_roles_without_duplicates() {
        let m = membership_for(TenantId::new(), &[Role::VIEWER, Role::CASHIER]);
        let reads = m.permissions.iter().filter(|p| **p == Permission::INVOICES_READ).count();
        assert_eq!(reads, 1);
        assert!(m.permissions.contains(&Permission::INVOICES_CREATE));
    }
}
