//! Process wiring: stores, sessions, tokens, metrics and background tasks.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use spadesk_auth::{JwtIssuer, JwtValidator};
use spadesk_events::InMemoryEventBus;
use spadesk_infra::{
    AppConfig, Backoffice, InMemorySessionStore, ListenerHandle, LogMailer, Metrics, SessionStore,
    StoreError, Stores, spawn_listeners, spawn_scheduler,
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not connect to postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session store unavailable: {0}")]
    Sessions(String),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("event listeners: {0}")]
    Listeners(#[from] std::io::Error),
}

/// Everything a handler needs, shared behind an `Arc`.
pub struct AppServices {
    pub backoffice: Arc<Backoffice>,
    pub sessions: Arc<dyn SessionStore>,
    pub issuer: JwtIssuer,
    pub validator: JwtValidator,
    pub metrics: Metrics,
    listeners: Option<ListenerHandle>,
    scheduler: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices").finish_non_exhaustive()
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
        }
        if let Some(listeners) = self.listeners.take() {
            listeners.shutdown();
        }
    }
}

/// Build the services for `config`.
///
/// `DATABASE_URL` selects Postgres stores (in-memory otherwise); `REDIS_URL`
/// selects Redis sessions when the `redis` feature is on. Must be called
/// from within a tokio runtime.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let stores = match &config.database_url {
        Some(url) => {
            info!("using postgres stores");
            Stores::postgres(PgPool::connect(url).await?).await?
        }
        None => {
            info!("using in-memory stores");
            Stores::in_memory()
        }
    };

    let sessions = session_store(config).await?;
    let bus = Arc::new(InMemoryEventBus::new());
    let mailer = Arc::new(LogMailer::new(config.mail_from.clone()));
    let backoffice = Arc::new(Backoffice::new(stores, bus, mailer));

    let metrics = Metrics::new()?;
    let listeners = spawn_listeners(backoffice.clone(), metrics.clone())?;
    let scheduler = config.job_interval.map(|interval| {
        info!(interval_secs = interval.as_secs(), "job scheduler started");
        spawn_scheduler(backoffice.clone(), interval)
    });

    let secret = config.jwt_secret.as_bytes();
    Ok(AppServices {
        backoffice,
        sessions,
        issuer: JwtIssuer::new(secret, config.access_ttl, config.refresh_ttl),
        validator: JwtValidator::new(secret),
        metrics,
        listeners: Some(listeners),
        scheduler,
    })
}

#[cfg(feature = "redis")]
async fn session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>, BootstrapError> {
    if let Some(url) = &config.redis_url {
        info!("using redis sessions");
        let store = spadesk_infra::sessions::RedisSessionStore::connect(url)
            .await
            .map_err(|e| BootstrapError::Sessions(e.to_string()))?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(InMemorySessionStore::new()))
}

#[cfg(not(feature = "redis"))]
async fn session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>, BootstrapError> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but the redis feature is off; sessions stay in memory");
    }
    Ok(Arc::new(InMemorySessionStore::new()))
}
