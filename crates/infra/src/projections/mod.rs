//! Projections: event handlers that maintain read models.

pub mod sales;

pub use sales::{ProjectionError, SalesProjector};
