//! `spadesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate contract, money arithmetic and pagination.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod page;
pub mod validation;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion, ensure_tenant};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::{Money, Rate};
pub use page::{Page, PageRequest, paginate};
