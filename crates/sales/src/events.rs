//! Sale events and their stored-form codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use kardex_core::{CashSessionId, CustomerId, Money, UserId, WarehouseId};
use kardex_events::Event;

use crate::sale::{PaymentMethod, SaleId, SaleLine};

/// Aggregate type under which sale streams are stored.
pub const SALE_AGGREGATE_TYPE: &str = "sales.sale";

pub const SALE_CREATED: &str = "sales.sale.created";
pub const SALE_VOIDED: &str = "sales.sale.voided";

/// Event: a draft sale was confirmed.
///
/// Full snapshot of the sale at confirmation time; the read model row and the
/// journal entry are both built from this payload alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCreated {
    pub sale_id: SaleId,
    pub customer_id: Option<CustomerId>,
    pub warehouse_id: WarehouseId,
    pub cash_session_id: CashSessionId,
    pub payment_method: PaymentMethod,
    /// Cashier who confirmed the sale.
    pub user_id: UserId,
    pub lines: Vec<SaleLine>,
    pub total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a confirmed sale was voided (compensating event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub sale_id: SaleId,
    pub reason: String,
    pub voided_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleCreated(SaleCreated),
    SaleVoided(SaleVoided),
}

impl SaleEvent {
    pub fn sale_id(&self) -> SaleId {
        match self {
            SaleEvent::SaleCreated(e) => e.sale_id,
            SaleEvent::SaleVoided(e) => e.sale_id,
        }
    }

    /// Serialize the variant's payload (without the enum tag; the tag is the
    /// stored `event_type`).
    pub fn encode(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            SaleEvent::SaleCreated(e) => serde_json::to_value(e),
            SaleEvent::SaleVoided(e) => serde_json::to_value(e),
        }
    }

    /// Decode a stored payload by its `event_type`.
    pub fn decode(event_type: &str, payload: &JsonValue) -> Result<Self, SaleEventDecodeError> {
        let decoder = DECODERS
            .iter()
            .find(|(name, _)| *name == event_type)
            .map(|(_, decode)| *decode)
            .ok_or_else(|| SaleEventDecodeError::UnknownEventType(event_type.to_string()))?;

        decoder(payload).map_err(|source| SaleEventDecodeError::Payload {
            event_type: event_type.to_string(),
            message: source.to_string(),
        })
    }
}

type Decoder = fn(&JsonValue) -> Result<SaleEvent, serde_json::Error>;

/// `event_type` → decoder. Every `SaleEvent` variant has exactly one entry.
const DECODERS: &[(&str, Decoder)] = &[
    (SALE_CREATED, decode_created),
    (SALE_VOIDED, decode_voided),
];

fn decode_created(payload: &JsonValue) -> Result<SaleEvent, serde_json::Error> {
    SaleCreated::deserialize(payload).map(SaleEvent::SaleCreated)
}

fn decode_voided(payload: &JsonValue) -> Result<SaleEvent, serde_json::Error> {
    SaleVoided::deserialize(payload).map(SaleEvent::SaleVoided)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaleEventDecodeError {
    #[error("unknown sale event type: {0}")]
    UnknownEventType(String),

    #[error("malformed {event_type} payload: {message}")]
    Payload { event_type: String, message: String },
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCreated(_) => SALE_CREATED,
            SaleEvent::SaleVoided(_) => SALE_VOIDED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleCreated(e) => e.occurred_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kardex_core::AggregateId;

    #[test]
    fn decode_reverses_encode_by_event_type() {
        let ev = SaleEvent::SaleVoided(SaleVoided {
            sale_id: SaleId::new(AggregateId::new()),
            reason: "customer changed mind".into(),
            voided_by: UserId::new(),
            occurred_at: Utc::now(),
        });

        let payload = ev.encode().unwrap();
        assert!(payload.get("reason").is_some());
        assert_eq!(SaleEvent::decode(ev.event_type(), &payload).unwrap(), ev);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = SaleEvent::decode("sales.sale.renamed", &serde_json::json!({})).unwrap_err();
        assert_eq!(
            err,
            SaleEventDecodeError::UnknownEventType("sales.sale.renamed".into())
        );
    }

    #[test]
    fn payload_of_wrong_shape_is_rejected() {
        let err = SaleEvent::decode(SALE_CREATED, &serde_json::json!({"reason": 1})).unwrap_err();
        assert!(matches!(err, SaleEventDecodeError::Payload { .. }));
    }
}
