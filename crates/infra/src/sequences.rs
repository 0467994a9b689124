//! Gap-tolerant counters for document numbers.
//!
//! A value handed out is never handed out again, even if the caller fails
//! afterwards; numbering may skip but never repeats.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use spadesk_core::TenantId;

use crate::store::{StoreError, map_sqlx_error};

#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically increment `key` and return the new value (first call → 1).
    async fn next(&self, tenant_id: TenantId, key: &str) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    counters: Mutex<HashMap<(TenantId, String), u64>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn next(&self, tenant_id: TenantId, key: &str) -> Result<u64, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Backend("sequence lock poisoned".to_string()))?;
        let value = counters.entry((tenant_id, key.to_string())).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresSequenceStore {
    pool: Arc<PgPool>,
}

impl PostgresSequenceStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceStore for PostgresSequenceStore {
    #[instrument(skip(self), err)]
    async fn next(&self, tenant_id: TenantId, key: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequences (tenant_id, key, value) VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, key) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(key)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_sequence", e))?;

        let value: i64 = row
            .try_get("value")
            .map_err(|e| map_sqlx_error("next_sequence", e))?;
        u64::try_from(value).map_err(|_| StoreError::Serialization(format!("negative sequence {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_are_per_tenant_and_key() {
        let seq = InMemorySequenceStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        assert_eq!(seq.next(a, "invoice:MAIN:2026").await.unwrap(), 1);
        assert_eq!(seq.next(a, "invoice:MAIN:2026").await.unwrap(), 2);
        assert_eq!(seq.next(a, "invoice:MAIN:2027").await.unwrap(), 1);
        assert_eq!(seq.next(b, "invoice:MAIN:2026").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_never_share_a_value() {
        let seq = Arc::new(InMemorySequenceStore::new());
        let tenant = TenantId::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let seq = seq.clone();
                tokio::spawn(async move { seq.next(tenant, "po:2026").await.unwrap() })
            })
            .collect();

        let mut values = Vec::new();
        for h in handles {
            values.push(h.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=16).collect::<Vec<u64>>());
    }
}
