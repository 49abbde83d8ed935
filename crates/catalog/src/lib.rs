//! Reference data consumed by the sales core (products, customers, warehouses,
//! cashiers) and the lookup ports it is read through.
//!
//! CRUD for these records lives outside this workspace.

pub mod reference;
pub mod repository;

pub use reference::{Cashier, Customer, Product, Warehouse};
pub use repository::{CatalogError, ProductRepository, ReferenceData};
