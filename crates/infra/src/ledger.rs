//! In-memory inventory ledger.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use kardex_core::{ProductId, Quantity, WarehouseId};
use kardex_inventory::{
    CommitGate, LedgerError, LedgerMovement, LedgerRepository, NewMovement, StockKey,
    check_movement, replay_balance,
};

#[derive(Debug, Default)]
struct KeyState {
    balance: Quantity,
    movements: Vec<LedgerMovement>,
}

/// Ledger with one mutex per `(warehouse, product)` key.
///
/// The outer map lock is only held to find or create a key's slot; movement
/// checks and appends run under the key mutex alone, so unrelated keys never
/// contend. Batches lock their keys in ascending [`StockKey`] order.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    keys: RwLock<HashMap<StockKey, Arc<Mutex<KeyState>>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_slot(&self, key: &StockKey) -> Result<Option<Arc<Mutex<KeyState>>>, LedgerError> {
        let keys = self.keys.read().map_err(|_| poisoned())?;
        Ok(keys.get(key).cloned())
    }

    fn slot(&self, key: StockKey) -> Result<Arc<Mutex<KeyState>>, LedgerError> {
        if let Some(slot) = self.existing_slot(&key)? {
            return Ok(slot);
        }
        let mut keys = self.keys.write().map_err(|_| poisoned())?;
        Ok(keys.entry(key).or_default().clone())
    }
}

fn poisoned() -> LedgerError {
    LedgerError::Storage("ledger lock poisoned".to_string())
}

impl LedgerRepository for InMemoryLedger {
    fn get_stock(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Quantity, LedgerError> {
        let key = StockKey::new(warehouse_id, product_id);
        match self.existing_slot(&key)? {
            Some(slot) => Ok(slot.lock().map_err(|_| poisoned())?.balance),
            None => Ok(Quantity::zero()),
        }
    }

    fn register_movement(&self, movement: NewMovement) -> Result<LedgerMovement, LedgerError> {
        self.register_batch(vec![movement], &mut || Ok(()))?
            .pop()
            .ok_or_else(|| LedgerError::Storage("movement was not applied".to_string()))
    }

    fn register_batch(
        &self,
        movements: Vec<NewMovement>,
        gate: &mut CommitGate<'_>,
    ) -> Result<Vec<LedgerMovement>, LedgerError> {
        let keys: BTreeSet<StockKey> = movements.iter().map(|m| m.key).collect();
        let slots = keys
            .iter()
            .map(|key| Ok((*key, self.slot(*key)?)))
            .collect::<Result<Vec<_>, LedgerError>>()?;

        // Ascending key order; every batch agrees on it, so no lock cycle.
        let mut guards: BTreeMap<StockKey, MutexGuard<'_, KeyState>> = BTreeMap::new();
        for (key, slot) in &slots {
            guards.insert(*key, slot.lock().map_err(|_| poisoned())?);
        }

        let mut running: BTreeMap<StockKey, Quantity> =
            guards.iter().map(|(k, s)| (*k, s.balance)).collect();
        for movement in &movements {
            let balance = running.get(&movement.key).copied().unwrap_or_default();
            let next = check_movement(movement, balance)?;
            running.insert(movement.key, next);
        }

        gate()?;

        let mut applied = Vec::with_capacity(movements.len());
        for movement in movements {
            let state = guards
                .get_mut(&movement.key)
                .ok_or_else(|| LedgerError::Storage(format!("{} is not locked", movement.key)))?;

            state.balance = state.balance + movement.quantity_delta;
            let row = LedgerMovement {
                position: state.movements.len() as u64 + 1,
                key: movement.key,
                movement_type: movement.movement_type,
                quantity_delta: movement.quantity_delta,
                unit_cost: movement.unit_cost,
                reference: movement.reference,
                occurred_at: movement.occurred_at,
                balance_after: state.balance,
            };
            tracing::debug!(
                key = %row.key,
                movement_type = row.movement_type.as_str(),
                delta = %row.quantity_delta,
                balance = %row.balance_after,
                "ledger movement applied"
            );
            state.movements.push(row.clone());
            applied.push(row);
        }

        Ok(applied)
    }

    fn movements(&self, key: StockKey) -> Result<Vec<LedgerMovement>, LedgerError> {
        match self.existing_slot(&key)? {
            Some(slot) => Ok(slot.lock().map_err(|_| poisoned())?.movements.clone()),
            None => Ok(vec![]),
        }
    }

    fn verify_balance(&self, key: StockKey) -> Result<Quantity, LedgerError> {
        let Some(slot) = self.existing_slot(&key)? else {
            return Ok(Quantity::zero());
        };
        let state = slot.lock().map_err(|_| poisoned())?;

        let replayed = replay_balance(&state.movements);
        if replayed != state.balance {
            tracing::warn!(%key, cached = %state.balance, %replayed, "ledger balance drift");
            return Err(LedgerError::BalanceDrift {
                key,
                cached: state.balance,
                replayed,
            });
        }
        Ok(replayed)
    }
}
