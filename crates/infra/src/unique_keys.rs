//! Per-tenant unique keys: customer contacts, SKUs, outlet and promotion
//! codes.
//!
//! Records are stored as opaque documents, so a value that must be unique
//! within a tenant is claimed here before the record carrying it is
//! written. A claim is atomic; two writers racing for one value see one
//! success and one [`StoreError::Conflict`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use spadesk_core::{AggregateId, TenantId};

use crate::backoffice::{Backoffice, generate_code};
use crate::command_dispatcher::DispatchError;
use crate::store::{StoreError, map_sqlx_error};

/// Attempts at drawing an unused generated code.
pub const GENERATED_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    CustomerEmail,
    CustomerPhone,
    ReferralCode,
    Sku,
    OutletCode,
    CouponCode,
    GiftCardCode,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::CustomerEmail => "customer_email",
            KeyKind::CustomerPhone => "customer_phone",
            KeyKind::ReferralCode => "referral_code",
            KeyKind::Sku => "sku",
            KeyKind::OutletCode => "outlet_code",
            KeyKind::CouponCode => "coupon_code",
            KeyKind::GiftCardCode => "gift_card_code",
        }
    }

    fn label(self) -> &'static str {
        match self {
            KeyKind::CustomerEmail => "a customer with e-mail",
            KeyKind::CustomerPhone => "a customer with phone",
            KeyKind::ReferralCode => "referral code",
            KeyKind::Sku => "sku",
            KeyKind::OutletCode => "outlet code",
            KeyKind::CouponCode => "coupon code",
            KeyKind::GiftCardCode => "gift card code",
        }
    }
}

/// An already normalized value of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    pub kind: KeyKind,
    pub value: String,
}

impl UniqueKey {
    pub fn new(kind: KeyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    fn taken(&self) -> StoreError {
        let verb = match self.kind {
            KeyKind::CustomerEmail | KeyKind::CustomerPhone => "already exists",
            _ => "is already in use",
        };
        StoreError::Conflict(format!("{} {} {verb}", self.kind.label(), self.value))
    }
}

#[async_trait]
pub trait UniqueKeyStore: Send + Sync {
    /// Claim `key` for `owner`. Claiming a key the owner already holds
    /// succeeds; a key held by another owner fails with
    /// [`StoreError::Conflict`].
    async fn claim(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError>;

    /// Drop `key` if `owner` holds it.
    async fn release(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryUniqueKeyStore {
    owners: RwLock<HashMap<(TenantId, UniqueKey), AggregateId>>,
}

impl InMemoryUniqueKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("unique key lock poisoned".to_string())
}

#[async_trait]
impl UniqueKeyStore for InMemoryUniqueKeyStore {
    async fn claim(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError> {
        let mut map = self.owners.write().map_err(|_| poisoned())?;
        let holder = *map.entry((tenant_id, key.clone())).or_insert(owner);
        if holder != owner {
            return Err(key.taken());
        }
        Ok(())
    }

    async fn release(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError> {
        let mut map = self.owners.write().map_err(|_| poisoned())?;
        let slot = (tenant_id, key.clone());
        if map.get(&slot) == Some(&owner) {
            map.remove(&slot);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresUniqueKeyStore {
    pool: Arc<PgPool>,
}

impl PostgresUniqueKeyStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UniqueKeyStore for PostgresUniqueKeyStore {
    #[instrument(skip(self, key), fields(kind = key.kind.as_str()), err)]
    async fn claim(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError> {
        // The no-op update makes RETURNING yield the current holder.
        let row = sqlx::query(
            "INSERT INTO unique_keys (tenant_id, kind, value, owner) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (tenant_id, kind, value) DO UPDATE SET owner = unique_keys.owner \
             RETURNING owner",
        )
        .bind(tenant_id.as_uuid())
        .bind(key.kind.as_str())
        .bind(&key.value)
        .bind(owner.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_unique_key", e))?;

        let holder: uuid::Uuid = row
            .try_get("owner")
            .map_err(|e| map_sqlx_error("claim_unique_key", e))?;
        if holder != *owner.as_uuid() {
            return Err(key.taken());
        }
        Ok(())
    }

    #[instrument(skip(self, key), fields(kind = key.kind.as_str()), err)]
    async fn release(
        &self,
        tenant_id: TenantId,
        key: &UniqueKey,
        owner: AggregateId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM unique_keys WHERE tenant_id = $1 AND kind = $2 AND value = $3 AND owner = $4",
        )
        .bind(tenant_id.as_uuid())
        .bind(key.kind.as_str())
        .bind(&key.value)
        .bind(owner.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release_unique_key", e))?;
        Ok(())
    }
}

impl Backoffice {
    /// Run `write` while `owner` moves from the `held` keys to `wanted`.
    ///
    /// Keys in `wanted` are claimed first. If a claim or `write` fails,
    /// the keys claimed here are given back; once `write` succeeds, the
    /// `held` keys no longer wanted are released.
    pub async fn with_unique_keys<T, Fut>(
        &self,
        tenant_id: TenantId,
        owner: impl Into<AggregateId>,
        held: &[UniqueKey],
        wanted: &[UniqueKey],
        write: impl FnOnce() -> Fut,
    ) -> Result<T, DispatchError>
    where
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let owner = owner.into();
        let fresh: Vec<UniqueKey> = wanted
            .iter()
            .filter(|key| !held.contains(key))
            .cloned()
            .collect();

        for (claimed, key) in fresh.iter().enumerate() {
            if let Err(err) = self.stores.unique_keys.claim(tenant_id, key, owner).await {
                self.release_unique_keys(tenant_id, owner, &fresh[..claimed])
                    .await;
                return Err(err.into());
            }
        }

        match write().await {
            Ok(value) => {
                let stale: Vec<UniqueKey> = held
                    .iter()
                    .filter(|key| !wanted.contains(key))
                    .cloned()
                    .collect();
                self.release_unique_keys(tenant_id, owner, &stale).await;
                Ok(value)
            }
            Err(err) => {
                self.release_unique_keys(tenant_id, owner, &fresh).await;
                Err(err)
            }
        }
    }

    /// Give keys back. A failed release is logged and leaves the value
    /// reserved.
    pub async fn release_unique_keys(
        &self,
        tenant_id: TenantId,
        owner: impl Into<AggregateId>,
        keys: &[UniqueKey],
    ) {
        let owner = owner.into();
        for key in keys {
            if let Err(err) = self.stores.unique_keys.release(tenant_id, key, owner).await {
                warn!(kind = key.kind.as_str(), error = %err, "unique key not released");
            }
        }
    }

    /// Claim a fresh `prefix` + random code for `owner`, drawing again when
    /// the value is taken.
    pub async fn claim_generated_code(
        &self,
        tenant_id: TenantId,
        kind: KeyKind,
        owner: impl Into<AggregateId>,
        prefix: &str,
        len: usize,
    ) -> Result<UniqueKey, DispatchError> {
        let owner = owner.into();
        for _ in 0..GENERATED_CODE_ATTEMPTS {
            let key = UniqueKey::new(kind, format!("{prefix}{}", generate_code(len)));
            match self.stores.unique_keys.claim(tenant_id, &key, owner).await {
                Ok(()) => return Ok(key),
                Err(StoreError::Conflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(DispatchError::Conflict(format!(
            "could not allocate a unique {}",
            kind.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_key_has_one_owner_per_tenant() {
        let store = InMemoryUniqueKeyStore::new();
        let tenant = TenantId::new();
        let (first, second) = (AggregateId::new(), AggregateId::new());
        let sku = UniqueKey::new(KeyKind::Sku, "OIL-050");

        store.claim(tenant, &sku, first).await.unwrap();
        store.claim(tenant, &sku, first).await.unwrap();
        let err = store.claim(tenant, &sku, second).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("sku OIL-050 is already in use".to_string()));

        // Other tenants and kinds are independent.
        store.claim(TenantId::new(), &sku, second).await.unwrap();
        store
            .claim(tenant, &UniqueKey::new(KeyKind::OutletCode, "OIL-050"), second)
            .await
            .unwrap();

        // Only the holder can release.
        store.release(tenant, &sku, second).await.unwrap();
        assert!(store.claim(tenant, &sku, second).await.is_err());
        store.release(tenant, &sku, first).await.unwrap();
        store.claim(tenant, &sku, second).await.unwrap();
    }
}
