//! The set of stores one process works against.

use std::sync::Arc;

use sqlx::PgPool;

use spadesk_accounts::{Account, Outlet};
use spadesk_auth::User;
use spadesk_catalog::{Product, Service};
use spadesk_core::AggregateRoot;
use spadesk_inventory::StockLedger;
use spadesk_invoicing::Invoice;
use spadesk_parties::{Customer, Employee, Vendor};
use spadesk_promotions::{Coupon, GiftCard};
use spadesk_purchasing::PurchaseOrder;

use crate::credentials::{CredentialStore, InMemoryCredentialStore, PostgresCredentialStore};
use crate::job_runs::{InMemoryJobRunStore, JobRunStore, PostgresJobRunStore};
use crate::sequences::{InMemorySequenceStore, PostgresSequenceStore, SequenceStore};
use crate::store::schema::migrate;
use crate::store::{InMemoryTenantStore, PostgresTenantStore, StoreError, TenantStore};
use crate::unique_keys::{InMemoryUniqueKeyStore, PostgresUniqueKeyStore, UniqueKeyStore};

/// Shared handle to the store of one aggregate type.
pub type Store<A> = Arc<dyn TenantStore<<A as AggregateRoot>::Id, A>>;

#[derive(Clone)]
pub struct Stores {
    pub accounts: Store<Account>,
    pub outlets: Store<Outlet>,
    pub users: Store<User>,
    pub customers: Store<Customer>,
    pub employees: Store<Employee>,
    pub vendors: Store<Vendor>,
    pub services: Store<Service>,
    pub products: Store<Product>,
    pub stock: Store<StockLedger>,
    pub coupons: Store<Coupon>,
    pub gift_cards: Store<GiftCard>,
    pub invoices: Store<Invoice>,
    pub purchase_orders: Store<PurchaseOrder>,
    pub sequences: Arc<dyn SequenceStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub unique_keys: Arc<dyn UniqueKeyStore>,
    pub job_runs: Arc<dyn JobRunStore>,
}

impl core::fmt::Debug for Stores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryTenantStore::new()),
            outlets: Arc::new(InMemoryTenantStore::new()),
            users: Arc::new(InMemoryTenantStore::new()),
            customers: Arc::new(InMemoryTenantStore::new()),
            employees: Arc::new(InMemoryTenantStore::new()),
            vendors: Arc::new(InMemoryTenantStore::new()),
            services: Arc::new(InMemoryTenantStore::new()),
            products: Arc::new(InMemoryTenantStore::new()),
            stock: Arc::new(InMemoryTenantStore::new()),
            coupons: Arc::new(InMemoryTenantStore::new()),
            gift_cards: Arc::new(InMemoryTenantStore::new()),
            invoices: Arc::new(InMemoryTenantStore::new()),
            purchase_orders: Arc::new(InMemoryTenantStore::new()),
            sequences: Arc::new(InMemorySequenceStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            unique_keys: Arc::new(InMemoryUniqueKeyStore::new()),
            job_runs: Arc::new(InMemoryJobRunStore::new()),
        }
    }

    /// Postgres-backed stores; creates the schema if needed.
    pub async fn postgres(pool: PgPool) -> Result<Self, StoreError> {
        migrate(&pool).await?;
        let pool = Arc::new(pool);
        Ok(Self {
            accounts: Arc::new(PostgresTenantStore::new(pool.clone())),
            outlets: Arc::new(PostgresTenantStore::new(pool.clone())),
            users: Arc::new(PostgresTenantStore::new(pool.clone())),
            customers: Arc::new(PostgresTenantStore::new(pool.clone())),
            employees: Arc::new(PostgresTenantStore::new(pool.clone())),
            vendors: Arc::new(PostgresTenantStore::new(pool.clone())),
            services: Arc::new(PostgresTenantStore::new(pool.clone())),
            products: Arc::new(PostgresTenantStore::new(pool.clone())),
            stock: Arc::new(PostgresTenantStore::new(pool.clone())),
            coupons: Arc::new(PostgresTenantStore::new(pool.clone())),
            gift_cards: Arc::new(PostgresTenantStore::new(pool.clone())),
            invoices: Arc::new(PostgresTenantStore::new(pool.clone())),
            purchase_orders: Arc::new(PostgresTenantStore::new(pool.clone())),
            sequences: Arc::new(PostgresSequenceStore::new(pool.clone())),
            credentials: Arc::new(PostgresCredentialStore::new(pool.clone())),
            unique_keys: Arc::new(PostgresUniqueKeyStore::new(pool.clone())),
            job_runs: Arc::new(PostgresJobRunStore::new(pool)),
        })
    }
}
