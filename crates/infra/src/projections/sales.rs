use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use kardex_catalog::{CatalogError, ReferenceData};
use kardex_core::AggregateId;
use kardex_events::EventEnvelope;
use kardex_sales::{SALE_AGGREGATE_TYPE, SaleCreated, SaleEvent, SaleEventDecodeError, SaleStatus, SaleVoided};

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::{ReadModelError, ReadModelWriter, SaleRow, SaleRowLine};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Decode(#[from] SaleEventDecodeError),

    #[error(transparent)]
    ReadModel(#[from] ReadModelError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// The store has no record of a version between the cursor and the
    /// delivered event.
    #[error("sale stream {aggregate_id} expected version {expected}, found {found}")]
    OutOfOrder {
        aggregate_id: AggregateId,
        expected: u64,
        found: u64,
    },
}

/// Builds the sales read model from sale events.
///
/// Live delivery comes from the bus: at least once, and not necessarily in
/// stream order. Each stream is applied strictly in `stream_version` order:
/// redeliveries are no-ops, and an event that arrives ahead of its
/// predecessors first pulls the missing ones from the event store.
/// [`SalesProjector::rebuild`] replays the whole log through the same
/// handlers.
#[derive(Debug)]
pub struct SalesProjector<R, W, S> {
    reference: R,
    rows: W,
    store: S,
    /// aggregate → last applied `stream_version`.
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<R, W, S> SalesProjector<R, W, S>
where
    R: ReferenceData,
    W: ReadModelWriter,
    S: EventStore,
{
    pub fn new(reference: R, rows: W, store: S) -> Self {
        Self {
            reference,
            rows,
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Insert the row for a confirmed sale, resolving display names now.
    pub fn on_sale_created(&self, event: &SaleCreated) -> Result<(), ProjectionError> {
        let customer_name = match event.customer_id {
            Some(id) => self.reference.customer_name(id)?,
            None => None,
        };

        let lines = event
            .lines
            .iter()
            .map(|l| {
                Ok(SaleRowLine {
                    line_no: l.line_no,
                    product_id: l.product_id,
                    product_name: self.reference.product_name(l.product_id)?,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    subtotal: l.subtotal,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        self.rows.insert_row(SaleRow {
            sale_id: event.sale_id,
            customer_id: event.customer_id,
            customer_name,
            warehouse_id: event.warehouse_id,
            warehouse_name: self.reference.warehouse_name(event.warehouse_id)?,
            cash_session_id: event.cash_session_id,
            user_id: event.user_id,
            user_name: self.reference.user_name(event.user_id)?,
            payment_method: event.payment_method,
            lines,
            total: event.total,
            status: SaleStatus::Confirmed,
            void_reason: None,
            confirmed_at: event.occurred_at,
        })?;
        Ok(())
    }

    pub fn on_sale_voided(&self, event: &SaleVoided) -> Result<(), ProjectionError> {
        self.rows
            .update_status(event.sale_id, SaleStatus::Void, Some(&event.reason))?;
        Ok(())
    }

    /// Apply one committed event, skipping anything already applied.
    ///
    /// Stream versions between the cursor and `envelope` are read from the
    /// store and applied first, so the cursor only ever moves by one.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<SaleEvent>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != SALE_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let version = envelope.stream_version();
        let cursor = self.cursor(aggregate_id);
        if version <= cursor {
            tracing::debug!(%aggregate_id, version, "duplicate sale event skipped");
            return Ok(());
        }

        if version > cursor + 1 {
            tracing::debug!(
                %aggregate_id,
                version,
                cursor,
                "sale event arrived ahead of its stream; catching up from the store"
            );
            let missing = self
                .store
                .load_stream(aggregate_id)?
                .into_iter()
                .filter(|stored| stored.stream_version > cursor && stored.stream_version < version);
            for stored in missing {
                self.project(&stored.to_envelope(SaleEvent::decode)?)?;
            }
        }

        self.project(envelope)
    }

    fn project(&self, envelope: &EventEnvelope<SaleEvent>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let version = envelope.stream_version();
        let expected = self.cursor(aggregate_id) + 1;
        if version != expected {
            return Err(ProjectionError::OutOfOrder {
                aggregate_id,
                expected,
                found: version,
            });
        }

        match envelope.payload() {
            SaleEvent::SaleCreated(e) => self.on_sale_created(e)?,
            SaleEvent::SaleVoided(e) => self.on_sale_voided(e)?,
        }

        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, version);
        }
        tracing::debug!(
            %aggregate_id,
            sequence = envelope.sequence(),
            event_type = envelope.event_type(),
            "sale event projected"
        );
        Ok(())
    }

    /// Truncate the read model and replay every sale event in log order.
    ///
    /// Deterministic for a fixed log and fixed reference data. Names are
    /// looked up again, so rows pick up reference data changed since the
    /// original projection. Returns the number of events replayed.
    pub fn rebuild(&self) -> Result<usize, ProjectionError> {
        self.rows.truncate()?;
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut history = self.store.read_all(Some(SALE_AGGREGATE_TYPE))?;
        history.sort_by_key(|e| e.sequence);

        for stored in &history {
            let envelope = stored.to_envelope(SaleEvent::decode)?;
            self.apply_envelope(&envelope)?;
        }

        tracing::info!(events = history.len(), "sales read model rebuilt");
        Ok(history.len())
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }
}
