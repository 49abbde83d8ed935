//! In-memory reference data (products, customers, warehouses, cashiers).

use std::collections::HashMap;
use std::sync::RwLock;

use kardex_catalog::{
    Cashier, CatalogError, Customer, Product, ProductRepository, ReferenceData, Warehouse,
};
use kardex_core::{CustomerId, ProductId, UserId, WarehouseId};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    cashiers: HashMap<UserId, Cashier>,
}

/// Catalog for tests, benches and single-process setups.
///
/// Records are upserted wholesale; a rename is just another upsert and shows
/// up in the next projection or rebuild.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: RwLock<Tables>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, product: Product) -> Result<(), CatalogError> {
        self.write(|t| {
            t.products.insert(product.id, product);
        })
    }

    pub fn upsert_customer(&self, customer: Customer) -> Result<(), CatalogError> {
        self.write(|t| {
            t.customers.insert(customer.id, customer);
        })
    }

    pub fn upsert_warehouse(&self, warehouse: Warehouse) -> Result<(), CatalogError> {
        self.write(|t| {
            t.warehouses.insert(warehouse.id, warehouse);
        })
    }

    pub fn upsert_cashier(&self, cashier: Cashier) -> Result<(), CatalogError> {
        self.write(|t| {
            t.cashiers.insert(cashier.id, cashier);
        })
    }

    fn write(&self, f: impl FnOnce(&mut Tables)) -> Result<(), CatalogError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))?;
        f(&mut tables);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, CatalogError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))?;
        Ok(f(&tables))
    }
}

impl ProductRepository for InMemoryCatalog {
    fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        self.read(|t| t.products.get(&id).cloned())
    }
}

impl ReferenceData for InMemoryCatalog {
    fn customer_name(&self, id: CustomerId) -> Result<Option<String>, CatalogError> {
        self.read(|t| t.customers.get(&id).map(|c| c.display_name.clone()))
    }

    fn warehouse_name(&self, id: WarehouseId) -> Result<Option<String>, CatalogError> {
        self.read(|t| t.warehouses.get(&id).map(|w| w.name.clone()))
    }

    fn user_name(&self, id: UserId) -> Result<Option<String>, CatalogError> {
        self.read(|t| t.cashiers.get(&id).map(|c| c.name.clone()))
    }

    fn product_name(&self, id: ProductId) -> Result<Option<String>, CatalogError> {
        self.read(|t| t.products.get(&id).map(|p| p.name.clone()))
    }
}
