//! Once-per-day guard for scheduled jobs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::instrument;

use spadesk_core::TenantId;

use crate::store::{StoreError, map_sqlx_error};

#[async_trait]
pub trait JobRunStore: Send + Sync {
    /// Record that `job` ran for `tenant_id` on `date`.
    ///
    /// Returns `false` when that run was already claimed; only the caller
    /// that gets `true` should do the work.
    async fn try_claim(
        &self,
        tenant_id: TenantId,
        job: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobRunStore {
    runs: Mutex<HashSet<(TenantId, String, NaiveDate)>>,
}

impl InMemoryJobRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRunStore for InMemoryJobRunStore {
    async fn try_claim(
        &self,
        tenant_id: TenantId,
        job: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Backend("job run lock poisoned".to_string()))?;
        Ok(runs.insert((tenant_id, job.to_string(), date)))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresJobRunStore {
    pool: Arc<PgPool>,
}

impl PostgresJobRunStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRunStore for PostgresJobRunStore {
    #[instrument(skip(self), err)]
    async fn try_claim(
        &self,
        tenant_id: TenantId,
        job: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO job_runs (tenant_id, job, run_on) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(tenant_id.as_uuid())
        .bind(job)
        .bind(date)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_job_run", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_run_is_claimed_once_per_day() {
        let runs = InMemoryJobRunStore::new();
        let tenant = TenantId::new();
        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let tomorrow = today.succ_opt().unwrap();

        assert!(runs.try_claim(tenant, "greetings", today).await.unwrap());
        assert!(!runs.try_claim(tenant, "greetings", today).await.unwrap());
        assert!(runs.try_claim(tenant, "daily_summary", today).await.unwrap());
        assert!(runs.try_claim(tenant, "greetings", tomorrow).await.unwrap());
    }
}
