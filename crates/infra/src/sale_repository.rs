//! Event-sourced [`SaleRepository`] on top of any [`EventStore`].

use kardex_core::{AggregateId, AggregateRoot, ExpectedVersion};
use kardex_events::{EventEnvelope, EventMetadata};
use kardex_sales::{SALE_AGGREGATE_TYPE, Sale, SaleEvent, SaleId, SaleRepository, SaleRepositoryError};

use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

/// Stores each sale as its own stream of `sales.sale` events.
#[derive(Debug, Clone)]
pub struct EventSourcedSaleRepository<S> {
    store: S,
}

impl<S> EventSourcedSaleRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> SaleRepository for EventSourcedSaleRepository<S>
where
    S: EventStore,
{
    fn next_id(&self) -> SaleId {
        SaleId::new(AggregateId::new())
    }

    fn save(
        &self,
        sale: &Sale,
        changes: &[SaleEvent],
        metadata: EventMetadata,
    ) -> Result<Vec<EventEnvelope<SaleEvent>>, SaleRepositoryError> {
        let sale_id = sale.id_typed().ok_or(SaleRepositoryError::Unassigned)?;
        if changes.is_empty() {
            return Ok(vec![]);
        }

        let expected = sale.version().saturating_sub(changes.len() as u64);

        let uncommitted = changes
            .iter()
            .map(|ev| {
                let payload = ev
                    .encode()
                    .map_err(|e| SaleRepositoryError::Storage(format!("encode failed: {e}")))?;
                Ok(UncommittedEvent::from_typed(
                    sale_id.0,
                    SALE_AGGREGATE_TYPE,
                    ev,
                    payload,
                    metadata,
                ))
            })
            .collect::<Result<Vec<_>, SaleRepositoryError>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(expected))
            .map_err(|err| match err {
                EventStoreError::Concurrency { actual, .. } => SaleRepositoryError::Concurrency {
                    sale_id,
                    expected,
                    actual,
                },
                other => SaleRepositoryError::Storage(other.to_string()),
            })?;

        committed
            .iter()
            .zip(changes)
            .map(|(stored, change)| {
                stored.to_envelope(|_, _| Ok::<_, SaleRepositoryError>(change.clone()))
            })
            .collect()
    }

    fn find_by_id(&self, id: SaleId) -> Result<Option<Sale>, SaleRepositoryError> {
        let stream = self
            .store
            .load_stream(id.0)
            .map_err(|e| SaleRepositoryError::Storage(e.to_string()))?;

        let events = stream
            .iter()
            .map(|stored| {
                if stored.aggregate_type != SALE_AGGREGATE_TYPE {
                    return Err(SaleRepositoryError::Corrupt(format!(
                        "stream {id} holds '{}' events",
                        stored.aggregate_type
                    )));
                }
                SaleEvent::decode(&stored.event_type, &stored.payload)
                    .map_err(|e| SaleRepositoryError::Corrupt(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Sale::from_history(events.iter()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use kardex_core::{CashSessionId, Money, ProductId, Quantity, UserId, WarehouseId};
    use kardex_sales::{PaymentMethod, SaleHeader, SaleStatus};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    fn repo() -> EventSourcedSaleRepository<Arc<InMemoryEventStore>> {
        EventSourcedSaleRepository::new(Arc::new(InMemoryEventStore::new()))
    }

    fn meta() -> EventMetadata {
        EventMetadata::new(UserId::new(), Uuid::now_v7())
    }

    fn confirmed(repo: &impl SaleRepository) -> (Sale, SaleEvent) {
        let mut sale = Sale::draft(SaleHeader {
            customer_id: None,
            warehouse_id: WarehouseId::new(),
            cash_session_id: CashSessionId::new(),
            payment_method: PaymentMethod::Cash,
        });
        sale.add_line(ProductId::new(), Quantity::from(2), Money::new(dec!(12.50)))
            .unwrap();
        let created = sale.confirm(repo.next_id(), UserId::new(), Utc::now()).unwrap();
        (sale, SaleEvent::SaleCreated(created))
    }

    #[test]
    fn saved_sale_is_rehydrated_from_its_stream() {
        let repo = repo();
        let (sale, created) = confirmed(&repo);

        let envelopes = repo.save(&sale, &[created.clone()], meta()).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].stream_version(), 1);
        assert_eq!(envelopes[0].aggregate_type(), SALE_AGGREGATE_TYPE);
        assert_eq!(envelopes[0].payload(), &created);

        let loaded = repo.find_by_id(sale.id_typed().unwrap()).unwrap().unwrap();
        assert_eq!(loaded, sale);
        assert_eq!(loaded.total(), Money::new(dec!(25.00)));
    }

    #[test]
    fn unknown_sale_is_none() {
        assert!(repo().find_by_id(SaleId::new(AggregateId::new())).unwrap().is_none());
    }

    #[test]
    fn stale_writer_gets_a_concurrency_error() {
        let repo = repo();
        let (sale, created) = confirmed(&repo);
        repo.save(&sale, &[created], meta()).unwrap();
        let id = sale.id_typed().unwrap();

        let mut first = repo.find_by_id(id).unwrap().unwrap();
        let mut second = repo.find_by_id(id).unwrap().unwrap();

        let void = first.void("wrong item", UserId::new(), Utc::now()).unwrap();
        repo.save(&first, &[SaleEvent::SaleVoided(void)], meta()).unwrap();

        let late = second.void("duplicate", UserId::new(), Utc::now()).unwrap();
        let err = repo
            .save(&second, &[SaleEvent::SaleVoided(late)], meta())
            .unwrap_err();
        match err {
            SaleRepositoryError::Concurrency {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            _ => panic!("expected concurrency error"),
        }

        let stored = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(stored.status(), SaleStatus::Void);
        assert_eq!(stored.void_reason(), Some("wrong item"));
    }

    #[test]
    fn drafts_cannot_be_saved() {
        let draft = Sale::draft(SaleHeader {
            customer_id: None,
            warehouse_id: WarehouseId::new(),
            cash_session_id: CashSessionId::new(),
            payment_method: PaymentMethod::Card,
        });
        assert_eq!(
            repo().save(&draft, &[], meta()).unwrap_err(),
            SaleRepositoryError::Unassigned
        );
    }
}
