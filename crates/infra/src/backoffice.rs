//! Application services shared by the HTTP layer and the job scheduler.
//!
//! `Backoffice` bundles the stores, the command dispatcher and the mailer.
//! Single-aggregate CRUD goes straight through [`Backoffice::dispatch`];
//! the cross-aggregate workflows (checkout, receiving, rewards, jobs) live
//! in their own modules as further `impl Backoffice` blocks.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use spadesk_accounts::Account;
use spadesk_core::{Aggregate, AggregateId, DomainError, TenantId};
use spadesk_events::{Event, EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::mailer::Mailer;
use crate::store::{Document, TenantStore};
use crate::stores::Stores;

/// The process-wide event bus.
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

#[derive(Clone)]
pub struct Backoffice {
    pub stores: Stores,
    pub dispatcher: Arc<CommandDispatcher<Bus>>,
    pub mailer: Arc<dyn Mailer>,
}

impl core::fmt::Debug for Backoffice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Backoffice").finish_non_exhaustive()
    }
}

impl Backoffice {
    pub fn new(stores: Stores, bus: Bus, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            stores,
            dispatcher: Arc::new(CommandDispatcher::new(bus)),
            mailer,
        }
    }

    pub fn bus(&self) -> &Bus {
        self.dispatcher.bus()
    }

    /// Run one command; see [`CommandDispatcher::dispatch`].
    pub async fn dispatch<A>(
        &self,
        store: &(dyn TenantStore<A::Id, A> + 'static),
        tenant_id: TenantId,
        id: A::Id,
        command: A::Command,
        make_aggregate: impl FnOnce(A::Id) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Document + Aggregate<Error = DomainError>,
        A::Id: Into<AggregateId> + Copy + Send + Sync + 'static,
        A::Event: Event + Serialize,
    {
        self.dispatcher
            .dispatch(store, tenant_id, id, command, make_aggregate)
            .await
            .map(|Dispatched { aggregate, .. }| aggregate)
    }

    /// A visible record, or `NotFound` (also for soft-deleted records).
    pub async fn find<A>(
        &self,
        store: &(dyn TenantStore<A::Id, A> + 'static),
        tenant_id: TenantId,
        id: &A::Id,
    ) -> Result<A, DispatchError>
    where
        A: Document,
        A::Id: Send + Sync + 'static,
    {
        store
            .get(tenant_id, id)
            .await?
            .filter(|record| record.is_visible())
            .ok_or(DispatchError::NotFound)
    }

    /// Visible records of the tenant in store order.
    pub async fn list<A>(
        &self,
        store: &(dyn TenantStore<A::Id, A> + 'static),
        tenant_id: TenantId,
    ) -> Result<Vec<A>, DispatchError>
    where
        A: Document,
        A::Id: Send + Sync + 'static,
    {
        Ok(store
            .list(tenant_id)
            .await?
            .into_iter()
            .filter(|record| record.is_visible())
            .collect())
    }

    /// The tenant's business account (keyed by the tenant id).
    pub async fn account(&self, tenant_id: TenantId) -> Result<Account, DispatchError> {
        self.find(self.stores.accounts.as_ref(), tenant_id, &AggregateId::from(tenant_id))
            .await
    }
}

/// Digits and capitals without the look-alikes I, L, O and U.
const CODE_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A random code of `len` characters from [`CODE_ALPHABET`] (referral, gift
/// card and coupon codes), five bits of entropy per character.
pub fn generate_code(len: usize) -> String {
    let mut code = String::with_capacity(len);
    while code.len() < len {
        // The low 62 bits of a v4 uuid are random.
        let mut bits = Uuid::new_v4().as_u128();
        for _ in 0..12.min(len - code.len()) {
            code.push(char::from(CODE_ALPHABET[(bits & 0x1f) as usize]));
            bits >>= 5;
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_uppercase_alphanumeric() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(spadesk_parties::customer::is_referral_code(&code));
        assert_ne!(generate_code(12), generate_code(12));
    }

    #[test]
    fn long_codes_draw_from_the_whole_alphabet() {
        let code = generate_code(40);
        assert_eq!(code.len(), 40);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert!(!code.contains(['I', 'L', 'O', 'U']));

        let distinct: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_code(16)).collect();
        assert_eq!(distinct.len(), 1000);
    }
}
