//! Ports implemented by the accounting persistence collaborator.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AccountingError;
use crate::journal::JournalEntry;

/// Journal storage.
pub trait AccountingRepository: Send + Sync {
    /// Persist header and lines as one atomic unit.
    ///
    /// Fails with [`AccountingError::DuplicateOrigin`] when an entry with the
    /// same `(origin_module, origin_id)` exists; nothing is written then.
    fn create_entry(&self, entry: JournalEntry) -> Result<(), AccountingError>;

    fn find_by_origin(
        &self,
        origin_module: &str,
        origin_id: Uuid,
    ) -> Result<Option<JournalEntry>, AccountingError>;
}

/// Maps a business date onto an accounting period code.
pub trait PeriodResolver: Send + Sync {
    /// `Ok(None)` when no period covers `date`.
    fn resolve(&self, date: NaiveDate) -> Result<Option<String>, AccountingError>;
}

impl<S> AccountingRepository for Arc<S>
where
    S: AccountingRepository + ?Sized,
{
    fn create_entry(&self, entry: JournalEntry) -> Result<(), AccountingError> {
        (**self).create_entry(entry)
    }

    fn find_by_origin(
        &self,
        origin_module: &str,
        origin_id: Uuid,
    ) -> Result<Option<JournalEntry>, AccountingError> {
        (**self).find_by_origin(origin_module, origin_id)
    }
}

impl<S> PeriodResolver for Arc<S>
where
    S: PeriodResolver + ?Sized,
{
    fn resolve(&self, date: NaiveDate) -> Result<Option<String>, AccountingError> {
        (**self).resolve(date)
    }
}
