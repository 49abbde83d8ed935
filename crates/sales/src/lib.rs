//! Point-of-sale `Sale` aggregate (event-sourced).
//!
//! A sale is built as an in-memory draft, confirmed once (emitting a full
//! `SaleCreated` snapshot) and optionally voided (emitting `SaleVoided`).
//! Pure domain logic; persistence goes through [`SaleRepository`].

pub mod events;
pub mod repository;
pub mod sale;

pub use events::{
    SALE_AGGREGATE_TYPE, SALE_CREATED, SALE_VOIDED, SaleCreated, SaleEvent, SaleEventDecodeError,
    SaleVoided,
};
pub use repository::{SaleRepository, SaleRepositoryError};
pub use sale::{
    ConfirmDraft, PaymentMethod, Sale, SaleCommand, SaleHeader, SaleId, SaleLine, SaleStatus,
    VoidConfirmed,
};
