//! Inventory ledger ("kardex") domain.
//!
//! Movement types, the ledger storage port and the stock validator. Pure
//! domain logic; storage implementations live in `kardex-infra`.

pub mod ledger;
pub mod movement;
pub mod validator;

pub use ledger::{CommitGate, LedgerError, LedgerRepository, check_movement};
pub use movement::{
    LedgerMovement, MovementReference, MovementType, NewMovement, StockKey, replay_balance,
};
pub use validator::{StockCheckError, StockValidator};
