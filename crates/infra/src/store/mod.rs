//! Tenant-isolated document storage.
//!
//! Every aggregate is persisted as a snapshot keyed by `(tenant_id, id)`.
//! Saves are compare-and-set on the aggregate version, which is what the
//! [`crate::command_dispatcher::CommandDispatcher`] relies on for
//! optimistic concurrency.

pub mod document;
pub mod postgres;
pub mod schema;
pub mod tenant_store;

use thiserror::Error;

pub use document::Document;
pub use postgres::PostgresTenantStore;
pub use tenant_store::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Version check failed or a unique key is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Map SQLx errors onto [`StoreError`]; unique violations become conflicts.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
