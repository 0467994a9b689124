//! Retail products sold over the counter.
//!
//! Stock is not held here: products with `track_inventory` get a FIFO
//! ledger in `spadesk-inventory`, keyed by the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::Violations;
use spadesk_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, Rate, TenantId, ensure_tenant,
};
use spadesk_events::Event;

spadesk_core::typed_id!(
    /// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ProductId,
    "product id"
);

/// Aggregate root: Product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    brand: Option<String>,
    category: Option<String>,
    price: Money,
    tax_rate: Option<Rate>,
    track_inventory: bool,
    reorder_level: u32,
    active: bool,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            brand: None,
            category: None,
            price: Money::ZERO,
            tax_rate: None,
            track_inventory: true,
            reorder_level: 0,
            active: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn tax_rate(&self) -> Option<Rate> {
        self.tax_rate
    }

    pub fn track_inventory(&self) -> bool {
        self.track_inventory
    }

    pub fn reorder_level(&self) -> u32 {
        self.reorder_level
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.deleted
    }

    /// Fails unless the product can go on an invoice.
    pub fn ensure_sellable(&self, tenant_id: TenantId) -> DomainResult<()> {
        self.ensure_live(tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("product {} is inactive", self.sku)));
        }
        Ok(())
    }

    fn ensure_live(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.is_visible() {
            return Err(DomainError::not_found());
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Mutable product attributes. On create, `sku`, `name` and `price` are
/// required; on update every `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<Money>,
    pub tax_rate: Option<Rate>,
    pub track_inventory: Option<bool>,
    pub reorder_level: Option<u32>,
}

/// Full attribute set carried by events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub sku: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Money,
    pub tax_rate: Option<Rate>,
    pub track_inventory: bool,
    pub reorder_level: u32,
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub patch: ProductPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Lifecycle commands carrying only tenant and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLifecycle {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    DeactivateProduct(ProductLifecycle),
    ActivateProduct(ProductLifecycle),
    DeleteProduct(ProductLifecycle),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductDeactivated { occurred_at: DateTime<Utc> },
    ProductActivated { occurred_at: DateTime<Utc> },
    ProductDeleted { occurred_at: DateTime<Utc> },
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::ProductDeactivated { .. } => "catalog.product.deactivated",
            ProductEvent::ProductActivated { .. } => "catalog.product.activated",
            ProductEvent::ProductDeleted { .. } => "catalog.product.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeactivated { occurred_at }
            | ProductEvent::ProductActivated { occurred_at }
            | ProductEvent::ProductDeleted { occurred_at } => *occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.set_details(&e.details);
                self.active = true;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => self.set_details(&e.details),
            ProductEvent::ProductDeactivated { .. } => self.active = false,
            ProductEvent::ProductActivated { .. } => self.active = true,
            ProductEvent::ProductDeleted { .. } => {
                self.active = false;
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
                    product_id: self.id,
                    details: self.merged(&cmd.patch)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::DeactivateProduct(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                if !self.active {
                    return Err(DomainError::invariant("product is already inactive"));
                }
                Ok(vec![ProductEvent::ProductDeactivated {
                    occurred_at: cmd.occurred_at,
                }])
            }
            ProductCommand::ActivateProduct(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                if self.active {
                    return Err(DomainError::invariant("product is already active"));
                }
                Ok(vec![ProductEvent::ProductActivated {
                    occurred_at: cmd.occurred_at,
                }])
            }
            ProductCommand::DeleteProduct(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![ProductEvent::ProductDeleted {
                    occurred_at: cmd.occurred_at,
                }])
            }
        }
    }
}

impl Product {
    fn set_details(&mut self, d: &ProductDetails) {
        self.sku = d.sku.clone();
        self.name = d.name.clone();
        self.brand = d.brand.clone();
        self.category = d.category.clone();
        self.price = d.price;
        self.tax_rate = d.tax_rate;
        self.track_inventory = d.track_inventory;
        self.reorder_level = d.reorder_level;
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.details.price.is_none() {
            return Err(DomainError::validation("price is required"));
        }

        // SKU uniqueness per tenant is checked by the application layer
        // before dispatching.
        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            details: self.merged(&cmd.details)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn merged(&self, patch: &ProductPatch) -> DomainResult<ProductDetails> {
        let text = |v: &Option<String>, cur: &Option<String>| match v {
            Some(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            None => cur.clone(),
        };
        let details = ProductDetails {
            sku: patch
                .sku
                .as_deref()
                .map(normalize_sku)
                .unwrap_or_else(|| self.sku.clone()),
            name: patch
                .name
                .as_deref()
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| self.name.clone()),
            brand: text(&patch.brand, &self.brand),
            category: text(&patch.category, &self.category),
            price: patch.price.unwrap_or(self.price),
            tax_rate: patch.tax_rate.or(self.tax_rate),
            track_inventory: patch.track_inventory.unwrap_or(self.track_inventory),
            reorder_level: patch.reorder_level.unwrap_or(self.reorder_level),
        };

        let mut v = Violations::new();
        v.check(is_valid_sku(&details.sku), "sku must be 1-32 letters, digits, '-' or '_'");
        v.require_non_empty(&details.name, "name");
        v.check(!details.price.is_negative(), "price must not be negative");
        v.check(
            details.tax_rate.is_none_or(|r| r <= Rate::HUNDRED_PERCENT),
            "tax_rate must not exceed 100%",
        );
        v.into_result()?;
        Ok(details)
    }
}

/// SKUs compare case-insensitively; stored uppercase.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_ascii_uppercase()
}

fn is_valid_sku(sku: &str) -> bool {
    (1..=32).contains(&sku.len())
        && sku
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(tenant_id: TenantId, product_id: ProductId, sku: &str) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            tenant_id,
            product_id,
            details: ProductPatch {
                sku: Some(sku.to_string()),
                name: Some("Lavender Oil 50ml".to_string()),
                brand: Some("Aroma".to_string()),
                price: Some(Money::from_minor(49_900)),
                reorder_level: Some(5),
                ..ProductPatch::default()
            },
            occurred_at: test_time(),
        })
    }

    fn created(tenant_id: TenantId) -> Product {
        let id = ProductId::generate();
        let mut product = Product::empty(id);
        for e in product.handle(&create_cmd(tenant_id, id, " oil-050 ")).unwrap() {
            product.apply(&e);
        }
        product
    }

    #[test]
    fn create_product_normalizes_sku() {
        let product = created(TenantId::new());
        assert_eq!(product.sku(), "OIL-050");
        assert!(product.track_inventory());
        assert!(product.is_active());
        assert_eq!(product.version, 1);
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let t = TenantId::new();
        let product = created(t);
        let err = product
            .handle(&create_cmd(t, product.id_typed(), "OIL-050"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn create_product_requires_price() {
        let id = ProductId::generate();
        let err = Product::empty(id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: TenantId::new(),
                product_id: id,
                details: ProductPatch {
                    sku: Some("X1".into()),
                    name: Some("Thing".into()),
                    ..ProductPatch::default()
                },
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("price is required"));
    }

    #[test]
    fn update_from_another_tenant_is_rejected() {
        let product = created(TenantId::new());
        let err = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                tenant_id: TenantId::new(),
                patch: ProductPatch::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deleted_product_is_not_sellable() {
        let t = TenantId::new();
        let mut product = created(t);
        for e in product
            .handle(&ProductCommand::DeleteProduct(ProductLifecycle {
                tenant_id: t,
                occurred_at: test_time(),
            }))
            .unwrap()
        {
            product.apply(&e);
        }
        assert_eq!(product.ensure_sellable(t), Err(DomainError::NotFound));
    }

    proptest! {
        #[test]
        fn valid_skus_survive_normalization(sku in "[a-zA-Z0-9_-]{1,32}") {
            prop_assert!(is_valid_sku(&normalize_sku(&sku)));
        }
    }
}
