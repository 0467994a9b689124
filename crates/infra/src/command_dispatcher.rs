//! Command execution pipeline (application-level orchestration).
//!
//! Every write in the back office goes through [`CommandDispatcher::dispatch`]:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the current snapshot (tenant-scoped; absent → fresh aggregate)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events to the snapshot (version += 1 per event)
//!   ↓
//! 4. Save with compare-and-set on the loaded version
//!   ↓
//! 5. Publish events to the bus (metrics, receipt e-mails)
//! ```
//!
//! Tenant isolation comes from the store key: an aggregate saved under one
//! tenant is simply absent when loaded under another.
//!
//! Publication happens strictly after the save. A publish failure is logged
//! and does not fail the command; subscribers are side channels and never
//! part of the consistency boundary.

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use spadesk_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use spadesk_events::{Event, EventBus, EventEnvelope};

use crate::store::{Document, StoreError, TenantStore};

/// How many times [`CommandDispatcher::dispatch_retrying`] runs a command
/// that keeps losing the version race.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Domain validation failure (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Domain invariant failure (deterministic).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Stale version or duplicate key.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Persisting the snapshot failed for a reason other than a conflict.
    #[error(transparent)]
    Store(StoreError),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => DispatchError::Conflict(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of a successful dispatch: the saved snapshot and the events that
/// produced it (empty when the command was a no-op).
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
}

/// Reusable command execution engine for snapshot-stored aggregates.
///
/// The dispatcher owns only the bus; the store is passed per call so one
/// dispatcher serves every aggregate collection.
///
/// ## Error Semantics
///
/// - **Domain errors**: validation, invariant, not-found map 1:1
/// - **Concurrency**: a lost compare-and-set → [`DispatchError::Conflict`]
/// - **Backend**: anything else the store reports → [`DispatchError::Store`]
#[derive(Debug)]
pub struct CommandDispatcher<B> {
    bus: B,
}

impl<B> CommandDispatcher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> CommandDispatcher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command against the aggregate stored under `(tenant_id, id)`.
    ///
    /// `make_aggregate` builds the empty aggregate used when nothing is
    /// stored yet (creation commands). Commands that decide no events
    /// return the loaded snapshot without writing.
    pub async fn dispatch<A, S>(
        &self,
        store: &S,
        tenant_id: TenantId,
        id: A::Id,
        command: A::Command,
        make_aggregate: impl FnOnce(A::Id) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Document + Aggregate<Error = DomainError>,
        A::Id: Into<AggregateId> + Copy + Send + Sync + 'static,
        A::Event: Event + Serialize,
        S: TenantStore<A::Id, A> + ?Sized,
    {
        // 1) Load snapshot (tenant-scoped)
        let mut aggregate = match store.get(tenant_id, &id).await? {
            Some(existing) => existing,
            None => make_aggregate(id),
        };
        let loaded_version = aggregate.version();

        // 2) Decide events (no mutation)
        let events = aggregate.handle(&command)?;
        if events.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events,
            });
        }

        // 3) Evolve state
        for event in &events {
            aggregate.apply(event);
        }

        // 4) Persist (compare-and-set on the loaded version)
        store
            .put(
                tenant_id,
                id,
                aggregate.clone(),
                ExpectedVersion::Exact(loaded_version),
            )
            .await?;

        debug!(
            collection = A::COLLECTION,
            tenant_id = %tenant_id,
            events = events.len(),
            version = aggregate.version(),
            "command applied"
        );

        // 5) Publish (after save)
        let aggregate_id: AggregateId = id.into();
        for (offset, event) in events.iter().enumerate() {
            let envelope = match to_envelope::<A>(
                tenant_id,
                aggregate_id,
                loaded_version + offset as u64 + 1,
                event,
            ) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, event_type = event.event_type(), "event not published");
                    continue;
                }
            };
            if let Err(err) = self.bus.publish(envelope) {
                warn!(error = ?err, event_type = event.event_type(), "event publication failed");
            }
        }

        Ok(Dispatched { aggregate, events })
    }

    /// Like [`dispatch`](Self::dispatch), but re-runs the command from a fresh
    /// load when another writer saved first. Gives up after [`MAX_ATTEMPTS`].
    pub async fn dispatch_retrying<A, S>(
        &self,
        store: &S,
        tenant_id: TenantId,
        id: A::Id,
        command: A::Command,
        make_aggregate: impl Fn(A::Id) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Document + Aggregate<Error = DomainError>,
        A::Id: Into<AggregateId> + Copy + Send + Sync + 'static,
        A::Event: Event + Serialize,
        S: TenantStore<A::Id, A> + ?Sized,
    {
        let mut attempt = 1;
        loop {
            match self
                .dispatch(store, tenant_id, id, command.clone(), &make_aggregate)
                .await
            {
                Err(DispatchError::Conflict(msg)) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, collection = A::COLLECTION, %msg, "retrying after conflict");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn to_envelope<A>(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    sequence_number: u64,
    event: &A::Event,
) -> Result<EventEnvelope<JsonValue>, DispatchError>
where
    A: Document + Aggregate,
    A::Event: Event + Serialize,
{
    let payload =
        serde_json::to_value(event).map_err(|e| DispatchError::Serialization(e.to_string()))?;
    Ok(EventEnvelope::new(
        Uuid::now_v7(),
        tenant_id,
        aggregate_id,
        A::COLLECTION,
        event.event_type(),
        sequence_number,
        event.occurred_at(),
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use spadesk_catalog::{Service, ServiceCommand, ServiceId, ServicePatch};
    use spadesk_core::{Money, Rate};
    use spadesk_events::InMemoryEventBus;

    use super::*;
    use crate::store::InMemoryTenantStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn create(tenant_id: TenantId) -> ServiceCommand {
        ServiceCommand::Create {
            tenant_id,
            details: ServicePatch {
                name: Some("Deep tissue massage".to_string()),
                category: Some("Massage".to_string()),
                duration_minutes: Some(60),
                price: Some(Money::from_minor(450_000)),
                tax_rate: Some(Rate::from_bps(1800)),
            },
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatch_saves_snapshot_and_publishes_envelopes() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let dispatcher = CommandDispatcher::new(bus);
        let store = InMemoryTenantStore::<ServiceId, Service>::new();
        let tenant = TenantId::new();
        let id = ServiceId::generate();

        let out = dispatcher
            .dispatch(&store, tenant, id, create(tenant), Service::empty)
            .await
            .unwrap();
        assert_eq!(out.aggregate.version, 1);
        assert_eq!(store.get(tenant, &id).await.unwrap().unwrap().version, 1);

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.tenant_id(), tenant);
        assert_eq!(envelope.aggregate_type(), "catalog.service");
        assert_eq!(envelope.sequence_number(), 1);
    }

    #[tokio::test]
    async fn other_tenants_cannot_address_the_aggregate() {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventBus::new()) as Bus);
        let store = InMemoryTenantStore::<ServiceId, Service>::new();
        let (owner, intruder) = (TenantId::new(), TenantId::new());
        let id = ServiceId::generate();
        dispatcher
            .dispatch(&store, owner, id, create(owner), Service::empty)
            .await
            .unwrap();

        let err = dispatcher
            .dispatch(
                &store,
                intruder,
                id,
                ServiceCommand::Deactivate {
                    tenant_id: intruder,
                    occurred_at: Utc::now(),
                },
                Service::empty,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound | DispatchError::InvariantViolation(_)));
        assert!(store.get(owner, &id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected_by_the_aggregate() {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventBus::new()) as Bus);
        let store = InMemoryTenantStore::<ServiceId, Service>::new();
        let tenant = TenantId::new();
        let id = ServiceId::generate();
        dispatcher
            .dispatch(&store, tenant, id, create(tenant), Service::empty)
            .await
            .unwrap();

        let again = dispatcher
            .dispatch(&store, tenant, id, create(tenant), Service::empty)
            .await;
        assert!(again.is_err());
        assert_eq!(store.get(tenant, &id).await.unwrap().unwrap().version, 1);
    }
}
