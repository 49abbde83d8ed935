//! Inventory ledger ("kardex") port.
//!
//! The ledger is an append-only list of signed movements per [`StockKey`]. The
//! current stock of a key is the sum of its movement deltas; implementations
//! keep a cached running balance but must never let it drift from the replay
//! (see [`LedgerRepository::verify_balance`]).

use std::sync::Arc;

use thiserror::Error;

use kardex_core::{DomainError, ProductId, Quantity, WarehouseId};

use crate::movement::{LedgerMovement, NewMovement, StockKey};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A stock-out would take the key's balance below zero.
    #[error("insufficient stock for {key} (available {available}, requested {requested})")]
    InsufficientStock {
        key: StockKey,
        available: Quantity,
        requested: Quantity,
    },

    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// The commit gate of a batch refused; nothing was applied.
    #[error("batch aborted: {0}")]
    Aborted(String),

    /// Cached balance and movement replay disagree.
    #[error("ledger balance drift for {key} (cached {cached}, replayed {replayed})")]
    BalanceDrift {
        key: StockKey,
        cached: Quantity,
        replayed: Quantity,
    },

    #[error("ledger storage failure: {0}")]
    Storage(String),
}

impl From<LedgerError> for DomainError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientStock {
                available,
                requested,
                ..
            } => DomainError::insufficient_stock(available, requested),
            LedgerError::InvalidMovement(msg) => DomainError::validation(msg),
            other => DomainError::invariant(other.to_string()),
        }
    }
}

/// Callback run by [`LedgerRepository::register_batch`] once every movement in
/// the batch has been checked, while the affected keys are still locked.
///
/// Returning `Err` aborts the batch with no movement applied.
pub type CommitGate<'a> = dyn FnMut() -> Result<(), LedgerError> + 'a;

/// Storage port for the inventory ledger.
pub trait LedgerRepository: Send + Sync {
    /// Current balance of a key (zero when the key has no movements).
    fn get_stock(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Quantity, LedgerError>;

    /// Append a single movement and update the running balance atomically.
    fn register_movement(&self, movement: NewMovement) -> Result<LedgerMovement, LedgerError>;

    /// Append several movements as one all-or-nothing unit.
    ///
    /// Affected keys are locked in ascending key order. Every stock-out is
    /// checked against the key's balance (including earlier movements of the
    /// same batch); the first shortfall fails the whole batch with
    /// [`LedgerError::InsufficientStock`]. When all checks pass, `gate` runs
    /// under the same locks and the movements are applied only if it succeeds.
    fn register_batch(
        &self,
        movements: Vec<NewMovement>,
        gate: &mut CommitGate<'_>,
    ) -> Result<Vec<LedgerMovement>, LedgerError>;

    /// All movements of a key, in insertion order.
    fn movements(&self, key: StockKey) -> Result<Vec<LedgerMovement>, LedgerError>;

    /// Recompute a key's balance from its movements and compare it with the
    /// cached value. Returns the balance when both agree.
    fn verify_balance(&self, key: StockKey) -> Result<Quantity, LedgerError>;
}

impl<S> LedgerRepository for Arc<S>
where
    S: LedgerRepository + ?Sized,
{
    fn get_stock(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Quantity, LedgerError> {
        (**self).get_stock(warehouse_id, product_id)
    }

    fn register_movement(&self, movement: NewMovement) -> Result<LedgerMovement, LedgerError> {
        (**self).register_movement(movement)
    }

    fn register_batch(
        &self,
        movements: Vec<NewMovement>,
        gate: &mut CommitGate<'_>,
    ) -> Result<Vec<LedgerMovement>, LedgerError> {
        (**self).register_batch(movements, gate)
    }

    fn movements(&self, key: StockKey) -> Result<Vec<LedgerMovement>, LedgerError> {
        (**self).movements(key)
    }

    fn verify_balance(&self, key: StockKey) -> Result<Quantity, LedgerError> {
        (**self).verify_balance(key)
    }
}

/// Check a movement against the balance it would be applied to.
///
/// Shared by ledger implementations so the gating rule lives in one place:
/// a zero delta is rejected, and no movement may leave the balance negative.
pub fn check_movement(movement: &NewMovement, balance: Quantity) -> Result<Quantity, LedgerError> {
    if movement.quantity_delta == Quantity::zero() {
        return Err(LedgerError::InvalidMovement(format!(
            "{} movement for {} has a zero quantity",
            movement.movement_type.as_str(),
            movement.key
        )));
    }

    let next = balance.checked_add(movement.quantity_delta).ok_or_else(|| {
        LedgerError::InvalidMovement(format!(
            "{} movement for {} overflows the balance",
            movement.movement_type.as_str(),
            movement.key
        ))
    })?;
    if next.is_negative() {
        return Err(LedgerError::InsufficientStock {
            key: movement.key,
            available: balance,
            requested: movement.quantity_delta.abs(),
        });
    }
    Ok(next)
}
