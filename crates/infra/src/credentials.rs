//! Global login index: e-mail → (tenant, user).
//!
//! User aggregates are tenant-scoped, but login happens before a tenant is
//! known, so the e-mail is claimed here first. A claim is the uniqueness
//! check for user e-mails across all tenants.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use spadesk_core::validation::normalize_email;
use spadesk_core::{TenantId, UserId};

use crate::store::{StoreError, map_sqlx_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the e-mail is taken.
    async fn claim(&self, email: &str, credential: Credential) -> Result<(), StoreError>;

    async fn lookup(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    /// Undo a claim whose user could not be created.
    async fn release(&self, email: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    by_email: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("credential lock poisoned".to_string())
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn claim(&self, email: &str, credential: Credential) -> Result<(), StoreError> {
        let mut map = self.by_email.write().map_err(|_| poisoned())?;
        let email = normalize_email(email);
        if map.contains_key(&email) {
            return Err(StoreError::Conflict(format!("e-mail {email} is already registered")));
        }
        map.insert(email, credential);
        Ok(())
    }

    async fn lookup(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let map = self.by_email.read().map_err(|_| poisoned())?;
        Ok(map.get(&normalize_email(email)).copied())
    }

    async fn release(&self, email: &str) -> Result<(), StoreError> {
        let mut map = self.by_email.write().map_err(|_| poisoned())?;
        map.remove(&normalize_email(email));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, email, credential), err)]
    async fn claim(&self, email: &str, credential: Credential) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO credentials (email, tenant_id, user_id) VALUES ($1, $2, $3)")
            .bind(normalize_email(email))
            .bind(credential.tenant_id.as_uuid())
            .bind(credential.user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| match map_sqlx_error("claim_credential", e) {
                StoreError::Conflict(_) => StoreError::Conflict("e-mail is already registered".to_string()),
                other => other,
            })?;
        Ok(())
    }

    #[instrument(skip(self, email), err)]
    async fn lookup(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query("SELECT tenant_id, user_id FROM credentials WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("lookup_credential", e))?;

        row.map(|r| {
            let tenant: uuid::Uuid = r
                .try_get("tenant_id")
                .map_err(|e| map_sqlx_error("lookup_credential", e))?;
            let user: uuid::Uuid = r
                .try_get("user_id")
                .map_err(|e| map_sqlx_error("lookup_credential", e))?;
            Ok(Credential {
                tenant_id: TenantId::from_uuid(tenant),
                user_id: UserId::from_uuid(user),
            })
        })
        .transpose()
    }

    #[instrument(skip(self, email), err)]
    async fn release(&self, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM credentials WHERE email = $1")
            .bind(normalize_email(email))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("release_credential", e))?;
        Ok(())
    }
}
