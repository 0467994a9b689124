use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use spadesk_core::{AggregateRoot, ExpectedVersion, TenantId};

use super::StoreError;

/// Tenant-isolated snapshot store.
///
/// `put` is a compare-and-set: the currently stored version (0 when the key
/// is absent) must satisfy `expected`, otherwise the write fails with
/// [`StoreError::Conflict`] and nothing changes.
#[async_trait]
pub trait TenantStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError>;

    async fn put(
        &self,
        tenant_id: TenantId,
        key: K,
        value: V,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Every record of the tenant, including soft-deleted ones.
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError>;

    /// Tenants holding at least one record (scheduled jobs iterate these).
    async fn tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

#[async_trait]
impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    K: Send + Sync + 'static,
    V: Send + 'static,
    S: TenantStore<K, V> + ?Sized,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(tenant_id, key).await
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        key: K,
        value: V,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).put(tenant_id, key, value, expected).await
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        (**self).list(tenant_id).await
    }

    async fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        (**self).tenants().await
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: AggregateRoot + Clone + Send + Sync + 'static,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&(tenant_id, key.clone())).cloned())
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        key: K,
        value: V,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let slot = (tenant_id, key);
        let current = map.get(&slot).map(AggregateRoot::version).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "expected version {expected:?}, found {current}"
            )));
        }
        map.insert(slot, value);
        Ok(())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        let mut tenants: Vec<TenantId> = map.keys().map(|(t, _)| *t).collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spadesk_core::AggregateId;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: AggregateId,
        version: u64,
    }

    impl AggregateRoot for Note {
        type Id = AggregateId;

        fn id(&self) -> &Self::Id {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_writers() {
        let store = InMemoryTenantStore::<AggregateId, Note>::new();
        let tenant = TenantId::new();
        let id = AggregateId::new();

        store
            .put(tenant, id, Note { id, version: 1 }, ExpectedVersion::Exact(0))
            .await
            .unwrap();
        let stale = store
            .put(tenant, id, Note { id, version: 2 }, ExpectedVersion::Exact(0))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));

        store
            .put(tenant, id, Note { id, version: 2 }, ExpectedVersion::Exact(1))
            .await
            .unwrap();
        assert_eq!(store.get(tenant, &id).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_other() {
        let store = InMemoryTenantStore::<AggregateId, Note>::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let id = AggregateId::new();
        store
            .put(t1, id, Note { id, version: 1 }, ExpectedVersion::Any)
            .await
            .unwrap();

        assert!(store.get(t2, &id).await.unwrap().is_none());
        assert!(store.list(t2).await.unwrap().is_empty());
        assert_eq!(store.list(t1).await.unwrap().len(), 1);
        assert_eq!(store.tenants().await.unwrap(), vec![t1]);
    }
}
