//! Postgres-backed document store.
//!
//! All aggregates share one `documents` table with a JSONB body. The
//! primary key `(tenant_id, collection, id)` scopes every query to a tenant,
//! and the `version` column carries the optimistic concurrency check:
//!
//! | expected | statement |
//! |---|---|
//! | `Exact(0)` | `INSERT` (unique violation → conflict) |
//! | `Exact(n)` | `UPDATE … WHERE version = n` (0 rows → conflict) |
//! | `Any` | `INSERT … ON CONFLICT DO UPDATE` |

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use spadesk_core::{ExpectedVersion, TenantId};

use super::{Document, StoreError, TenantStore, map_sqlx_error};

pub struct PostgresTenantStore<K, V> {
    pool: Arc<PgPool>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> PostgresTenantStore<K, V> {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

impl<K, V> core::fmt::Debug for PostgresTenantStore<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTenantStore").finish_non_exhaustive()
    }
}

fn db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Serialization(format!("version {version} out of range")))
}

fn decode<V: Document>(body: serde_json::Value) -> Result<V, StoreError> {
    serde_json::from_value(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl<K, V> TenantStore<K, V> for PostgresTenantStore<K, V>
where
    K: Display + Send + Sync + 'static,
    V: Document,
{
    #[instrument(skip(self, key), fields(collection = V::COLLECTION, id = %key), err)]
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        let row = sqlx::query(
            "SELECT body FROM documents WHERE tenant_id = $1 AND collection = $2 AND id = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .bind(key.to_string())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| {
            let body: serde_json::Value = r
                .try_get("body")
                .map_err(|e| map_sqlx_error("get", e))?;
            decode(body)
        })
        .transpose()
    }

    #[instrument(skip(self, key, value), fields(collection = V::COLLECTION, id = %key), err)]
    async fn put(
        &self,
        tenant_id: TenantId,
        key: K,
        value: V,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let version = db_version(value.version())?;
        let body =
            serde_json::to_value(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = key.to_string();

        match expected {
            ExpectedVersion::Exact(0) => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (tenant_id, collection, id, version, body)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(V::COLLECTION)
                .bind(&id)
                .bind(version)
                .bind(&body)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert", e))?;
            }
            ExpectedVersion::Exact(current) => {
                let result = sqlx::query(
                    r#"
                    UPDATE documents
                    SET version = $4, body = $5, updated_at = now()
                    WHERE tenant_id = $1 AND collection = $2 AND id = $3 AND version = $6
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(V::COLLECTION)
                .bind(&id)
                .bind(version)
                .bind(&body)
                .bind(db_version(current)?)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("update", e))?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict(format!(
                        "{} {id} is no longer at version {current}",
                        V::COLLECTION
                    )));
                }
            }
            ExpectedVersion::Any => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (tenant_id, collection, id, version, body)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (tenant_id, collection, id)
                    DO UPDATE SET version = EXCLUDED.version, body = EXCLUDED.body, updated_at = now()
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(V::COLLECTION)
                .bind(&id)
                .bind(version)
                .bind(&body)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("upsert", e))?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(collection = V::COLLECTION), err)]
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM documents WHERE tenant_id = $1 AND collection = $2 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.into_iter()
            .map(|r| {
                let body: serde_json::Value = r
                    .try_get("body")
                    .map_err(|e| map_sqlx_error("list", e))?;
                decode(body)
            })
            .collect()
    }

    #[instrument(skip(self), fields(collection = V::COLLECTION), err)]
    async fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM documents WHERE collection = $1 ORDER BY tenant_id",
        )
        .bind(V::COLLECTION)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenants", e))?;

        rows.into_iter()
            .map(|r| {
                r.try_get::<uuid::Uuid, _>("tenant_id")
                    .map(TenantId::from_uuid)
                    .map_err(|e| map_sqlx_error("tenants", e))
            })
            .collect()
    }
}
