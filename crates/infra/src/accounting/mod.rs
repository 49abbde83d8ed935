//! Accounting engine and its in-memory storage.

pub mod engine;
pub mod in_memory;

pub use engine::{AccountingEngine, BookingOutcome, EngineError};
pub use in_memory::{InMemoryJournal, MonthlyPeriods};
