use std::collections::HashMap;
use std::sync::RwLock;

use kardex_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Log {
    /// The whole log in `sequence` order.
    events: Vec<StoredEvent>,
    /// aggregate → indexes into `events`, in `stream_version` order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// A single write lock covers the global sequence counter and every stream,
/// so appends are serialized and sequences have no gaps.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events (all streams).
    pub fn len(&self) -> usize {
        self.log.read().map(|l| l.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        // All events must target the same aggregate stream.
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut log = self
            .log
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        let stream = log.streams.get(&aggregate_id).cloned().unwrap_or_default();
        let current = stream.len() as u64;

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency {
                expected: expected_version,
                actual: current,
            });
        }

        // Enforce aggregate type stability across the stream.
        if let Some(&first) = stream.first() {
            let existing = &log.events[first].aggregate_type;
            if *existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut version = current;
        for e in events {
            version += 1;
            let position = log.events.len();
            let stored = StoredEvent {
                event_id: e.event_id,
                sequence: position as u64 + 1,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                stream_version: version,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
                metadata: e.metadata,
            };
            log.events.push(stored.clone());
            log.streams.entry(aggregate_id).or_default().push(position);
            committed.push(stored);
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            stream_version = version,
            count = committed.len(),
            "events appended"
        );

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(log
            .streams
            .get(&aggregate_id)
            .map(|idx| idx.iter().map(|&i| log.events[i].clone()).collect())
            .unwrap_or_default())
    }

    fn read_all(&self, aggregate_type: Option<&str>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(log
            .events
            .iter()
            .filter(|e| aggregate_type.is_none_or(|t| e.aggregate_type == t))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kardex_core::UserId;
    use kardex_events::EventMetadata;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str, n: u64) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "n": n }),
            metadata: EventMetadata::new(UserId::new(), Uuid::now_v7()),
        }
    }

    #[test]
    fn sequences_are_global_and_versions_per_stream() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        store
            .append(vec![event(a, "t", 1), event(a, "t", 2)], ExpectedVersion::Exact(0))
            .unwrap();
        let stored_b = store
            .append(vec![event(b, "t", 3)], ExpectedVersion::Exact(0))
            .unwrap();
        let stored_a = store
            .append(vec![event(a, "t", 4)], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!((stored_b[0].sequence, stored_b[0].stream_version), (3, 1));
        assert_eq!((stored_a[0].sequence, stored_a[0].stream_version), (4, 3));

        let all = store.read_all(None).unwrap();
        let seqs: Vec<u64> = all.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let stream: Vec<u64> = store
            .load_stream(a)
            .unwrap()
            .iter()
            .map(|e| e.stream_version)
            .collect();
        assert_eq!(stream, vec![1, 2, 3]);
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store
            .append(vec![event(a, "t", 1)], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(a, "t", 2)], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert_eq!(
            err,
            EventStoreError::Concurrency {
                expected: ExpectedVersion::Exact(0),
                actual: 1
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn read_all_filters_by_aggregate_type() {
        let store = InMemoryEventStore::new();
        store
            .append(vec![event(AggregateId::new(), "sales.sale", 1)], ExpectedVersion::Any)
            .unwrap();
        store
            .append(vec![event(AggregateId::new(), "other", 2)], ExpectedVersion::Any)
            .unwrap();

        let sales = store.read_all(Some("sales.sale")).unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].sequence, 1);
    }

    #[test]
    fn mixed_batches_and_type_changes_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();

        let err = store
            .append(
                vec![event(a, "t", 1), event(AggregateId::new(), "t", 2)],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        store
            .append(vec![event(a, "t", 1)], ExpectedVersion::Any)
            .unwrap();
        let err = store
            .append(vec![event(a, "u", 2)], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
        assert!(store.read_all(None).unwrap().len() == 1);
    }
}
