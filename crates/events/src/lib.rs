//! Domain events: the contract, the envelope and a broadcast bus.
//!
//! Aggregates emit events; the dispatcher wraps them in envelopes after the
//! new state is saved and publishes them so side channels (metrics, receipt
//! e-mails) can react without being part of the write path.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
