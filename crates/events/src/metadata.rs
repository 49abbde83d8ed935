use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_core::UserId;

/// Who caused an event and through which command.
///
/// Stored next to the payload (not inside it) so audit data can evolve without
/// touching the event schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// User on whose behalf the command ran.
    pub actor: UserId,
    /// Id of the command that produced the event.
    pub causation_id: Uuid,
}

impl EventMetadata {
    pub fn new(actor: UserId, causation_id: Uuid) -> Self {
        Self {
            actor,
            causation_id,
        }
    }
}
