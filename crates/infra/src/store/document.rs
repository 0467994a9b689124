use serde::Serialize;
use serde::de::DeserializeOwned;

use spadesk_accounts::{Account, Outlet};
use spadesk_auth::User;
use spadesk_catalog::{Product, Service};
use spadesk_core::AggregateRoot;
use spadesk_inventory::StockLedger;
use spadesk_invoicing::Invoice;
use spadesk_parties::{Customer, Employee, Vendor};
use spadesk_promotions::{Coupon, GiftCard};
use spadesk_purchasing::PurchaseOrder;

/// An aggregate snapshot that can live in a document collection.
pub trait Document:
    AggregateRoot + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection name; doubles as the aggregate type on event envelopes.
    const COLLECTION: &'static str;

    /// Whether lookups and lists should return this record.
    fn is_visible(&self) -> bool;
}

impl Document for Account {
    const COLLECTION: &'static str = "accounts.account";

    fn is_visible(&self) -> bool {
        self.created
    }
}

impl Document for Outlet {
    const COLLECTION: &'static str = "accounts.outlet";

    fn is_visible(&self) -> bool {
        self.created
    }
}

impl Document for User {
    const COLLECTION: &'static str = "auth.user";

    fn is_visible(&self) -> bool {
        self.created
    }
}

impl Document for Customer {
    const COLLECTION: &'static str = "parties.customer";

    fn is_visible(&self) -> bool {
        Customer::is_visible(self)
    }
}

impl Document for Employee {
    const COLLECTION: &'static str = "parties.employee";

    fn is_visible(&self) -> bool {
        Employee::is_visible(self)
    }
}

impl Document for Vendor {
    const COLLECTION: &'static str = "parties.vendor";

    fn is_visible(&self) -> bool {
        self.is_created()
    }
}

impl Document for Service {
    const COLLECTION: &'static str = "catalog.service";

    fn is_visible(&self) -> bool {
        Service::is_visible(self)
    }
}

impl Document for Product {
    const COLLECTION: &'static str = "catalog.product";

    fn is_visible(&self) -> bool {
        Product::is_visible(self)
    }
}

impl Document for StockLedger {
    const COLLECTION: &'static str = "inventory.stock_ledger";

    fn is_visible(&self) -> bool {
        self.tenant_id().is_some()
    }
}

impl Document for Coupon {
    const COLLECTION: &'static str = "promotions.coupon";

    fn is_visible(&self) -> bool {
        Coupon::is_visible(self)
    }
}

impl Document for GiftCard {
    const COLLECTION: &'static str = "promotions.gift_card";

    fn is_visible(&self) -> bool {
        self.is_created()
    }
}

impl Document for Invoice {
    const COLLECTION: &'static str = "invoicing.invoice";

    fn is_visible(&self) -> bool {
        self.is_created()
    }
}

impl Document for PurchaseOrder {
    const COLLECTION: &'static str = "purchasing.purchase_order";

    fn is_visible(&self) -> bool {
        self.is_created()
    }
}
