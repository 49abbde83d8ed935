use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use kardex_core::{AggregateId, ExpectedVersion};
use kardex_events::{EventEnvelope, EventMetadata};
use std::sync::Arc;

/// An event ready to be appended (not yet assigned a position in the log).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: produced by the aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized payload plus stream and audit metadata
/// 3. **StoredEvent**: persisted with its global `sequence` and `stream_version`
/// 4. **EventEnvelope**: decoded and published to the bus
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
    pub metadata: EventMetadata,
}

/// A persisted event record. Never updated, never deleted.
///
/// ## Positions
///
/// - `sequence`: global, gap-free, strictly increasing across the whole log
///   (the total order `read_all` and rebuilds use)
/// - `stream_version`: 1-based position inside the aggregate's own stream
///   (the value optimistic concurrency checks against)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub sequence: u64,

    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub stream_version: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
    pub metadata: EventMetadata,
}

impl StoredEvent {
    /// Decode the payload with `decode` (keyed by `event_type`) into a typed envelope.
    pub fn to_envelope<E, D, Err>(&self, decode: D) -> Result<EventEnvelope<E>, Err>
    where
        D: FnOnce(&str, &JsonValue) -> Result<E, Err>,
    {
        let payload = decode(&self.event_type, &self.payload)?;
        Ok(EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence,
            self.stream_version,
            self.metadata,
            self.occurred_at,
            payload,
        ))
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency, stream shape), as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The stream is not at the expected version.
    #[error("optimistic concurrency check failed (expected {expected:?}, actual {actual})")]
    Concurrency {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event serialization failed: {0}")]
    Serialization(String),

    #[error("event store unavailable: {0}")]
    Storage(String),
}

/// Append-only, totally ordered event log.
///
/// ## Append Semantics
///
/// `append()`:
/// - requires every event of the batch to target the same aggregate stream
/// - checks `expected_version` against the stream's current version
/// - assigns `stream_version`s (current + 1, ...) and global `sequence`s
/// - persists the batch atomically (all or nothing)
///
/// ## Read Semantics
///
/// - `load_stream()`: one aggregate's events, by `stream_version`
/// - `read_all()`: the whole log (optionally one aggregate type), by `sequence`
///
/// No operation mutates or removes a stored record; corrections are new events.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn read_all(&self, aggregate_type: Option<&str>) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn read_all(&self, aggregate_type: Option<&str>) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read_all(aggregate_type)
    }
}

impl UncommittedEvent {
    /// Build from a typed domain event; `payload` is the already-encoded body.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event: &E,
        payload: JsonValue,
        metadata: EventMetadata,
    ) -> Self
    where
        E: kardex_events::Event,
    {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
            metadata,
        }
    }
}
