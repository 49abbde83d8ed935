//! Append-only event store boundary.
//!
//! The store is the source of truth for sales: every committed fact lives here
//! and the read model, the journal and external audit subscribers can always
//! be rebuilt from it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
