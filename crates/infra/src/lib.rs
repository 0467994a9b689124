//! Infrastructure layer: stores, dispatch, sessions, config, jobs and the
//! cross-aggregate workflows.

pub mod backoffice;
pub mod checkout;
pub mod command_dispatcher;
pub mod config;
pub mod credentials;
pub mod job_runs;
pub mod jobs;
pub mod listeners;
pub mod mailer;
pub mod metrics;
pub mod receiving;
pub mod rewards;
pub mod sequences;
pub mod sessions;
pub mod store;
pub mod stores;
pub mod unique_keys;

#[cfg(test)]
mod integration_tests;

pub use backoffice::{Backoffice, Bus, generate_code};
pub use checkout::{CheckoutLine, CheckoutRequest, GiftCardTender};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::{AppConfig, ConfigError};
pub use jobs::{JobReport, spawn_scheduler};
pub use listeners::{ListenerHandle, spawn_listeners};
pub use mailer::{LogMailer, MailMessage, Mailer, MailerError};
pub use metrics::Metrics;
pub use receiving::{OutletStock, StockLevel};
pub use sessions::{InMemorySessionStore, SessionError, SessionStore};
pub use store::{Document, StoreError, TenantStore};
pub use stores::Stores;
pub use unique_keys::{KeyKind, UniqueKey, UniqueKeyStore};
