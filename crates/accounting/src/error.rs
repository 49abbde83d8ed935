use thiserror::Error;
use uuid::Uuid;

use kardex_core::Money;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("journal entry has no lines")]
    EmptyEntry,

    #[error("invalid journal line: {0}")]
    InvalidLine(String),

    #[error("debits must equal credits (debits {debits}, credits {credits})")]
    Unbalanced { debits: Money, credits: Money },

    /// An entry for this business fact already exists.
    #[error("entry already booked for {origin_module}/{origin_id}")]
    DuplicateOrigin {
        origin_module: String,
        origin_id: Uuid,
    },

    /// Reference data needed to book the entry is missing (e.g. a product).
    #[error("cannot book entry: {0}")]
    MissingReference(String),

    #[error("accounting storage failure: {0}")]
    Storage(String),
}
