//! Persistence port for the sale aggregate.

use std::sync::Arc;

use thiserror::Error;

use kardex_events::{EventEnvelope, EventMetadata};

use crate::events::SaleEvent;
use crate::sale::{Sale, SaleId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaleRepositoryError {
    /// The stored stream moved past the version the changes were decided on.
    #[error("sale {sale_id} was modified concurrently (expected version {expected}, actual {actual})")]
    Concurrency {
        sale_id: SaleId,
        expected: u64,
        actual: u64,
    },

    /// A sale without an id (still a draft) cannot be persisted.
    #[error("sale has no id; confirm it before saving")]
    Unassigned,

    #[error("stored sale stream is unreadable: {0}")]
    Corrupt(String),

    #[error("sale storage failure: {0}")]
    Storage(String),
}

/// Event-sourced sale storage.
///
/// `save` appends the events a sale produced since it was loaded; the expected
/// stream version is `sale.version() - changes.len()`, so a concurrent writer
/// makes the append fail with [`SaleRepositoryError::Concurrency`] instead of
/// silently interleaving.
pub trait SaleRepository: Send + Sync {
    /// Allocate an identity for a sale about to be confirmed.
    fn next_id(&self) -> SaleId;

    /// Persist `changes` (already applied to `sale`) and return them as committed envelopes.
    fn save(
        &self,
        sale: &Sale,
        changes: &[SaleEvent],
        metadata: EventMetadata,
    ) -> Result<Vec<EventEnvelope<SaleEvent>>, SaleRepositoryError>;

    fn find_by_id(&self, id: SaleId) -> Result<Option<Sale>, SaleRepositoryError>;
}

impl<S> SaleRepository for Arc<S>
where
    S: SaleRepository + ?Sized,
{
    fn next_id(&self) -> SaleId {
        (**self).next_id()
    }

    fn save(
        &self,
        sale: &Sale,
        changes: &[SaleEvent],
        metadata: EventMetadata,
    ) -> Result<Vec<EventEnvelope<SaleEvent>>, SaleRepositoryError> {
        (**self).save(sale, changes, metadata)
    }

    fn find_by_id(&self, id: SaleId) -> Result<Option<Sale>, SaleRepositoryError> {
        (**self).find_by_id(id)
    }
}
