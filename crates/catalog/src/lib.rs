//! `spadesk-catalog`: services and retail products the business sells.

pub mod product;
pub mod service;

pub use product::{Product, ProductCommand, ProductEvent, ProductId, ProductPatch};
pub use service::{Service, ServiceCommand, ServiceEvent, ServiceId, ServicePatch};

use serde::{Deserialize, Serialize};

/// Which catalog an invoice line or coupon scope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Service,
    Product,
}
