//! Infrastructure layer of the point-of-sale core: storage adapters, the
//! command pipeline, projections, accounting and process wiring.

pub mod accounting;
pub mod app;
pub mod catalog;
pub mod command_dispatcher;
pub mod commands;
pub mod config;
pub mod event_store;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod projections;
pub mod read_model;
pub mod sale_repository;
pub mod workers;

pub use app::PointOfSale;
pub use config::PosConfig;
