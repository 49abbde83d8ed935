use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_core::{Money, ProductId, Quantity, WarehouseId};

/// Ledger key: one running balance per (warehouse, product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            warehouse_id,
            product_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.warehouse_id, self.product_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Sale,
    Purchase,
    Adjustment,
    VoidReversal,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "SALE",
            MovementType::Purchase => "PURCHASE",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::VoidReversal => "VOID_REVERSAL",
        }
    }
}

/// What produced a movement (e.g. `("sale", <sale id>)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl MovementReference {
    pub fn new(reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id,
        }
    }
}

/// A movement request, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Signed: negative takes stock out, positive puts it back.
    pub quantity_delta: Quantity,
    /// Cost per unit of the stock moved; never a selling price.
    pub unit_cost: Money,
    pub reference: MovementReference,
    pub occurred_at: DateTime<Utc>,
}

impl NewMovement {
    /// Stock-out for a sale line.
    pub fn sale(
        key: StockKey,
        quantity: Quantity,
        unit_cost: Money,
        reference: MovementReference,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            movement_type: MovementType::Sale,
            quantity_delta: -quantity.abs(),
            unit_cost,
            reference,
            occurred_at,
        }
    }

    /// Offsetting stock-in when a sale is voided.
    pub fn void_reversal(
        key: StockKey,
        quantity: Quantity,
        unit_cost: Money,
        reference: MovementReference,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            movement_type: MovementType::VoidReversal,
            quantity_delta: quantity.abs(),
            unit_cost,
            reference,
            occurred_at,
        }
    }

    pub fn purchase(
        key: StockKey,
        quantity: Quantity,
        unit_cost: Money,
        reference: MovementReference,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            movement_type: MovementType::Purchase,
            quantity_delta: quantity.abs(),
            unit_cost,
            reference,
            occurred_at,
        }
    }

    pub fn adjustment(
        key: StockKey,
        quantity_delta: Quantity,
        reference: MovementReference,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            movement_type: MovementType::Adjustment,
            quantity_delta,
            unit_cost: Money::zero(),
            reference,
            occurred_at,
        }
    }
}

/// An applied, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMovement {
    /// Position within the key's history (1-based, insertion order).
    pub position: u64,
    pub key: StockKey,
    pub movement_type: MovementType,
    pub quantity_delta: Quantity,
    pub unit_cost: Money,
    pub reference: MovementReference,
    pub occurred_at: DateTime<Utc>,
    /// Cached running balance right after this movement.
    pub balance_after: Quantity,
}

/// Replay a key's movements in insertion order.
pub fn replay_balance<'a>(movements: impl IntoIterator<Item = &'a LedgerMovement>) -> Quantity {
    movements.into_iter().map(|m| m.quantity_delta).sum()
}
