//! Disposable, eventually consistent read models.
//!
//! Everything here can be truncated and rebuilt from the event store.

pub mod sales;

pub use sales::{
    InMemorySalesReadModel, ReadModelError, ReadModelWriter, SaleRow, SaleRowLine, SalesQueries,
};
