use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::NaiveDate;
use uuid::Uuid;

use kardex_accounting::{AccountingError, AccountingRepository, JournalEntry, PeriodResolver};

#[derive(Debug, Default)]
struct Book {
    entries: Vec<JournalEntry>,
    by_origin: HashMap<(String, Uuid), usize>,
}

/// In-memory journal. An entry (header plus lines) is stored under a single
/// write lock, so it is either fully visible or not at all.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    book: RwLock<Book>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, in booking order.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, AccountingError> {
        let book = self.book.read().map_err(|_| poisoned())?;
        Ok(book.entries.clone())
    }
}

fn poisoned() -> AccountingError {
    AccountingError::Storage("journal lock poisoned".to_string())
}

impl AccountingRepository for InMemoryJournal {
    fn create_entry(&self, entry: JournalEntry) -> Result<(), AccountingError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;

        let origin = (
            entry.header().origin_module.clone(),
            entry.header().origin_id,
        );
        if book.by_origin.contains_key(&origin) {
            return Err(AccountingError::DuplicateOrigin {
                origin_module: origin.0,
                origin_id: origin.1,
            });
        }

        let position = book.entries.len();
        book.entries.push(entry);
        book.by_origin.insert(origin, position);
        Ok(())
    }

    fn find_by_origin(
        &self,
        origin_module: &str,
        origin_id: Uuid,
    ) -> Result<Option<JournalEntry>, AccountingError> {
        let book = self.book.read().map_err(|_| poisoned())?;
        Ok(book
            .by_origin
            .get(&(origin_module.to_string(), origin_id))
            .map(|&i| book.entries[i].clone()))
    }
}

/// Calendar-month periods coded `YYYY-MM`.
///
/// Either every month is open, or only an explicit list; a closed month
/// resolves to `None`.
#[derive(Debug, Clone, Default)]
pub struct MonthlyPeriods {
    open: Option<BTreeSet<String>>,
}

impl MonthlyPeriods {
    pub fn every_month() -> Self {
        Self { open: None }
    }

    pub fn only<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            open: Some(codes.into_iter().map(Into::into).collect()),
        }
    }
}

impl PeriodResolver for MonthlyPeriods {
    fn resolve(&self, date: NaiveDate) -> Result<Option<String>, AccountingError> {
        let code = date.format("%Y-%m").to_string();
        Ok(match &self.open {
            None => Some(code),
            Some(open) => open.contains(&code).then_some(code),
        })
    }
}
