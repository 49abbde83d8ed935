//! Pre-confirmation stock check.

use thiserror::Error;

use kardex_catalog::{CatalogError, ProductRepository};
use kardex_core::{DomainError, ProductId, Quantity, WarehouseId};

use crate::ledger::{LedgerError, LedgerRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockCheckError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Answers "can this quantity leave this warehouse?" without reserving it.
///
/// The answer is advisory. The authoritative check happens again inside the
/// ledger batch at commit time, under the per-key lock.
#[derive(Debug, Clone)]
pub struct StockValidator<P, L> {
    products: P,
    ledger: L,
}

impl<P, L> StockValidator<P, L>
where
    P: ProductRepository,
    L: LedgerRepository,
{
    pub fn new(products: P, ledger: L) -> Self {
        Self { products, ledger }
    }

    /// `Ok(())` when the product does not track stock, or when the ledger
    /// balance covers `requested`; otherwise `InsufficientStock`.
    pub fn check_availability(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        requested: Quantity,
    ) -> Result<(), StockCheckError> {
        let product = self
            .products
            .find_by_id(product_id)?
            .ok_or(DomainError::NotFound)?;

        if !product.tracks_stock {
            return Ok(());
        }

        let available = self.ledger.get_stock(warehouse_id, product_id)?;
        if available < requested {
            tracing::debug!(
                warehouse_id = %warehouse_id,
                product_id = %product_id,
                %available,
                %requested,
                "stock check failed"
            );
            return Err(DomainError::insufficient_stock(available, requested).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ledger::CommitGate;
    use crate::movement::{LedgerMovement, NewMovement, StockKey};
    use kardex_catalog::Product;

    struct Products(HashMap<ProductId, Product>);

    impl ProductRepository for Products {
        fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
            Ok(self.0.get(&id).cloned())
        }
    }

    struct FixedBalance(Quantity);

    impl LedgerRepository for FixedBalance {
        fn get_stock(&self, _: WarehouseId, _: ProductId) -> Result<Quantity, LedgerError> {
            Ok(self.0)
        }

        fn register_movement(&self, _: NewMovement) -> Result<LedgerMovement, LedgerError> {
            Err(LedgerError::Storage("read-only".into()))
        }

        fn register_batch(
            &self,
            _: Vec<NewMovement>,
            _: &mut CommitGate<'_>,
        ) -> Result<Vec<LedgerMovement>, LedgerError> {
            Err(LedgerError::Storage("read-only".into()))
        }

        fn movements(&self, _: StockKey) -> Result<Vec<LedgerMovement>, LedgerError> {
            Ok(Vec::new())
        }

        fn verify_balance(&self, _: StockKey) -> Result<Quantity, LedgerError> {
            Ok(self.0)
        }
    }

    fn validator(product: Product, balance: i64) -> StockValidator<Products, FixedBalance> {
        let mut products = HashMap::new();
        products.insert(product.id, product);
        StockValidator::new(Products(products), FixedBalance(Quantity::from(balance)))
    }

    #[test]
    fn untracked_product_always_passes() {
        let product = Product::new(ProductId::new(), "SRV", "Service").untracked();
        let id = product.id;
        let v = validator(product, 0);
        assert!(v
            .check_availability(WarehouseId::new(), id, Quantity::from(1_000))
            .is_ok());
    }

    #[test]
    fn tracked_product_fails_when_short() {
        let product = Product::new(ProductId::new(), "SKU", "Widget");
        let id = product.id;
        let v = validator(product, 10);

        let err = v
            .check_availability(WarehouseId::new(), id, Quantity::from(15))
            .unwrap_err();
        assert_eq!(
            err,
            StockCheckError::Domain(DomainError::InsufficientStock {
                available: Quantity::from(10),
                requested: Quantity::from(15),
            })
        );
    }

    #[test]
    fn exact_balance_is_enough() {
        let product = Product::new(ProductId::new(), "SKU", "Widget");
        let id = product.id;
        let v = validator(product, 10);
        assert!(v
            .check_availability(WarehouseId::new(), id, Quantity::from(10))
            .is_ok());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let v = validator(Product::new(ProductId::new(), "SKU", "Widget"), 10);
        let err = v
            .check_availability(WarehouseId::new(), ProductId::new(), Quantity::from(1))
            .unwrap_err();
        assert_eq!(err, StockCheckError::Domain(DomainError::NotFound));
    }
}
