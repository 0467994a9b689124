//! Idempotent schema bootstrap for the Postgres backend.

use sqlx::PgPool;
use tracing::info;

use super::{StoreError, map_sqlx_error};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        tenant_id UUID NOT NULL,
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        version BIGINT NOT NULL CHECK (version > 0),
        body JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (tenant_id, collection, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sequences (
        tenant_id UUID NOT NULL,
        key TEXT NOT NULL,
        value BIGINT NOT NULL,
        PRIMARY KEY (tenant_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credentials (
        email TEXT PRIMARY KEY,
        tenant_id UUID NOT NULL,
        user_id UUID NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unique_keys (
        tenant_id UUID NOT NULL,
        kind TEXT NOT NULL,
        value TEXT NOT NULL,
        owner UUID NOT NULL,
        PRIMARY KEY (tenant_id, kind, value)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        tenant_id UUID NOT NULL,
        job TEXT NOT NULL,
        run_on DATE NOT NULL,
        PRIMARY KEY (tenant_id, job, run_on)
    )
    "#,
];

pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    info!(tables = STATEMENTS.len(), "postgres schema ready");
    Ok(())
}
