use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (`"<resource>.<action>"`).
///
/// The wildcard `"*"` grants everything and is only handed out by policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ACCOUNT_READ: Permission = Permission::of("account.read");
    pub const ACCOUNT_MANAGE: Permission = Permission::of("account.manage");
    pub const USERS_READ: Permission = Permission::of("users.read");
    pub const USERS_MANAGE: Permission = Permission::of("users.manage");
    pub const OUTLETS_READ: Permission = Permission::of("outlets.read");
    pub const OUTLETS_MANAGE: Permission = Permission::of("outlets.manage");
    pub const CUSTOMERS_READ: Permission = Permission::of("customers.read");
    pub const CUSTOMERS_CREATE: Permission = Permission::of("customers.create");
    pub const CUSTOMERS_UPDATE: Permission = Permission::of("customers.update");
    pub const CUSTOMERS_DELETE: Permission = Permission::of("customers.delete");
    pub const EMPLOYEES_READ: Permission = Permission::of("employees.read");
    pub const EMPLOYEES_MANAGE: Permission = Permission::of("employees.manage");
    pub const VENDORS_READ: Permission = Permission::of("vendors.read");
    pub const VENDORS_MANAGE: Permission = Permission::of("vendors.manage");
    pub const CATALOG_READ: Permission = Permission::of("catalog.read");
    pub const CATALOG_MANAGE: Permission = Permission::of("catalog.manage");
    pub const INVENTORY_READ: Permission = Permission::of("inventory.read");
    pub const INVENTORY_MANAGE: Permission = Permission::of("inventory.manage");
    pub const COUPONS_READ: Permission = Permission::of("coupons.read");
    pub const COUPONS_MANAGE: Permission = Permission::of("coupons.manage");
    pub const GIFT_CARDS_READ: Permission = Permission::of("gift_cards.read");
    pub const GIFT_CARDS_ISSUE: Permission = Permission::of("gift_cards.issue");
    pub const GIFT_CARDS_MANAGE: Permission = Permission::of("gift_cards.manage");
    pub const REWARDS_REDEEM: Permission = Permission::of("rewards.redeem");
    pub const INVOICES_READ: Permission = Permission::of("invoices.read");
    pub const INVOICES_CREATE: Permission = Permission::of("invoices.create");
    pub const INVOICES_PAY: Permission = Permission::of("invoices.pay");
    pub const INVOICES_VOID: Permission = Permission::of("invoices.void");
    pub const PURCHASING_READ: Permission = Permission::of("purchasing.read");
    pub const PURCHASING_MANAGE: Permission = Permission::of("purchasing.manage");
    pub const REPORTS_READ: Permission = Permission::of("reports.read");

    /// Every concrete permission known to the policy.
    pub const ALL: &'static [Permission] = &[
        Self::ACCOUNT_READ,
        Self::ACCOUNT_MANAGE,
        Self::USERS_READ,
        Self::USERS_MANAGE,
        Self::OUTLETS_READ,
        Self::OUTLETS_MANAGE,
        Self::CUSTOMERS_READ,
        Self::CUSTOMERS_CREATE,
        Self::CUSTOMERS_UPDATE,
        Self::CUSTOMERS_DELETE,
        Self::EMPLOYEES_READ,
        Self::EMPLOYEES_MANAGE,
        Self::VENDORS_READ,
        Self::VENDORS_MANAGE,
        Self::CATALOG_READ,
        Self::CATALOG_MANAGE,
        Self::INVENTORY_READ,
        Self::INVENTORY_MANAGE,
        Self::COUPONS_READ,
        Self::COUPONS_MANAGE,
        Self::GIFT_CARDS_READ,
        Self::GIFT_CARDS_ISSUE,
        Self::GIFT_CARDS_MANAGE,
        Self::REWARDS_REDEEM,
        Self::INVOICES_READ,
        Self::INVOICES_CREATE,
        Self::INVOICES_PAY,
        Self::INVOICES_VOID,
        Self::PURCHASING_READ,
        Self::PURCHASING_MANAGE,
        Self::REPORTS_READ,
    ];

    const fn of(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    pub fn is_read(&self) -> bool {
        self.as_str().ends_with(".read")
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
