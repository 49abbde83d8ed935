//! Lookup ports implemented by the external catalog/persistence collaborator.

use std::sync::Arc;

use thiserror::Error;

use kardex_core::{CustomerId, ProductId, UserId, WarehouseId};

use crate::Product;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog storage failure: {0}")]
    Storage(String),
}

/// Product lookup used by stock validation and accounting.
pub trait ProductRepository: Send + Sync {
    fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, CatalogError>;
}

/// Display-name lookups used to enrich the sales read model.
///
/// Always answers with *current* reference data: a rename shows up in the next
/// projection or rebuild, never retroactively in stored events.
pub trait ReferenceData: Send + Sync {
    fn customer_name(&self, id: CustomerId) -> Result<Option<String>, CatalogError>;
    fn warehouse_name(&self, id: WarehouseId) -> Result<Option<String>, CatalogError>;
    fn user_name(&self, id: UserId) -> Result<Option<String>, CatalogError>;
    fn product_name(&self, id: ProductId) -> Result<Option<String>, CatalogError>;
}

impl<S> ProductRepository for Arc<S>
where
    S: ProductRepository + ?Sized,
{
    fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        (**self).find_by_id(id)
    }
}

impl<S> ReferenceData for Arc<S>
where
    S: ReferenceData + ?Sized,
{
    fn customer_name(&self, id: CustomerId) -> Result<Option<String>, CatalogError> {
        (**self).customer_name(id)
    }

    fn warehouse_name(&self, id: WarehouseId) -> Result<Option<String>, CatalogError> {
        (**self).warehouse_name(id)
    }

    fn user_name(&self, id: UserId) -> Result<Option<String>, CatalogError> {
        (**self).user_name(id)
    }

    fn product_name(&self, id: ProductId) -> Result<Option<String>, CatalogError> {
        (**self).product_name(id)
    }
}
