use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kardex_core::{CashSessionId, CustomerId, Money, ProductId, Quantity, UserId, WarehouseId};
use kardex_sales::{PaymentMethod, SaleId, SaleStatus};

/// Denormalized sale line, with the product name resolved at projection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRowLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// One row per confirmed sale.
///
/// Display names are looked up when the row is projected; they reflect the
/// reference data current at that moment, not at the time of the sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRow {
    pub sale_id: SaleId,
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub warehouse_id: WarehouseId,
    pub warehouse_name: Option<String>,
    pub cash_session_id: CashSessionId,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub lines: Vec<SaleRowLine>,
    pub total: Money,
    pub status: SaleStatus,
    pub void_reason: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadModelError {
    #[error("no read model row for sale {0}")]
    RowNotFound(SaleId),

    #[error("read model storage failure: {0}")]
    Storage(String),
}

/// Write side of the sales read model (used by the projector only).
pub trait ReadModelWriter: Send + Sync {
    /// Insert a row, replacing any row with the same `sale_id`.
    fn insert_row(&self, row: SaleRow) -> Result<(), ReadModelError>;

    /// Update status and reason of an existing row in place.
    fn update_status(
        &self,
        sale_id: SaleId,
        status: SaleStatus,
        reason: Option<&str>,
    ) -> Result<(), ReadModelError>;

    /// Drop every row (rebuild support).
    fn truncate(&self) -> Result<(), ReadModelError>;
}

pub trait SalesQueries: Send + Sync {
    fn get(&self, sale_id: SaleId) -> Result<Option<SaleRow>, ReadModelError>;

    /// All rows ordered by sale id.
    fn list(&self) -> Result<Vec<SaleRow>, ReadModelError>;
}

impl<S> ReadModelWriter for Arc<S>
where
    S: ReadModelWriter + ?Sized,
{
    fn insert_row(&self, row: SaleRow) -> Result<(), ReadModelError> {
        (**self).insert_row(row)
    }

    fn update_status(
        &self,
        sale_id: SaleId,
        status: SaleStatus,
        reason: Option<&str>,
    ) -> Result<(), ReadModelError> {
        (**self).update_status(sale_id, status, reason)
    }

    fn truncate(&self) -> Result<(), ReadModelError> {
        (**self).truncate()
    }
}

impl<S> SalesQueries for Arc<S>
where
    S: SalesQueries + ?Sized,
{
    fn get(&self, sale_id: SaleId) -> Result<Option<SaleRow>, ReadModelError> {
        (**self).get(sale_id)
    }

    fn list(&self) -> Result<Vec<SaleRow>, ReadModelError> {
        (**self).list()
    }
}

/// In-memory sales read model, keyed (and therefore listed) by sale id.
#[derive(Debug, Default)]
pub struct InMemorySalesReadModel {
    rows: RwLock<BTreeMap<SaleId, SaleRow>>,
}

impl InMemorySalesReadModel {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ReadModelError {
    ReadModelError::Storage("read model lock poisoned".to_string())
}

impl ReadModelWriter for InMemorySalesReadModel {
    fn insert_row(&self, row: SaleRow) -> Result<(), ReadModelError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.insert(row.sale_id, row);
        Ok(())
    }

    fn update_status(
        &self,
        sale_id: SaleId,
        status: SaleStatus,
        reason: Option<&str>,
    ) -> Result<(), ReadModelError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let row = rows
            .get_mut(&sale_id)
            .ok_or(ReadModelError::RowNotFound(sale_id))?;
        row.status = status;
        row.void_reason = reason.map(str::to_string);
        Ok(())
    }

    fn truncate(&self) -> Result<(), ReadModelError> {
        self.rows.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

impl SalesQueries for InMemorySalesReadModel {
    fn get(&self, sale_id: SaleId) -> Result<Option<SaleRow>, ReadModelError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.get(&sale_id).cloned())
    }

    fn list(&self) -> Result<Vec<SaleRow>, ReadModelError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.values().cloned().collect())
    }
}
