//! Accounting module (double-entry journal).
//!
//! Balanced journal entries, the sale posting rules and the storage ports the
//! accounting engine books through. Pure domain logic only.

pub mod error;
pub mod journal;
pub mod posting;
pub mod repository;

pub use error::AccountingError;
pub use journal::{AccountingEntry, AccountingLine, EntryId, JournalEntry};
pub use posting::{
    ChartOfAccounts, ORIGIN_SALE, ORIGIN_SALE_VOID, SaleAmounts, sale_entry, split_sale,
    void_entry,
};
pub use repository::{AccountingRepository, PeriodResolver};
