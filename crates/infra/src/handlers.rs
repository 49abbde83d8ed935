//! Sale command handlers.
//!
//! Each command decides on the aggregate, then commits in one step: the
//! ledger locks and checks every affected stock key, the sale events are
//! appended while those locks are held, and only then are the movements
//! applied. If the append fails no movement is applied; if a movement check
//! fails nothing is appended. Publishing happens after the commit and can
//! never undo it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use kardex_catalog::ProductRepository;
use kardex_core::{AggregateRoot, Quantity};
use kardex_events::{Command, EventBus, EventEnvelope, EventMetadata};
use kardex_inventory::{
    LedgerError, LedgerRepository, MovementReference, MovementType, NewMovement, StockKey,
    StockValidator,
};
use kardex_sales::{Sale, SaleEvent, SaleHeader, SaleId, SaleRepository};

use crate::command_dispatcher::{CommandHandler, DispatchError};
use crate::commands::{ConfirmSale, SaleReceipt, SalesCommand, VoidSale};

/// Reference type of the stock-out movements of a confirmed sale.
pub const SALE_MOVEMENT_REFERENCE: &str = "sales.sale";
/// Reference type of the stock-in movements written when a sale is voided.
pub const VOID_MOVEMENT_REFERENCE: &str = "sales.void";

/// Application service behind the sale command handlers.
#[derive(Debug)]
pub struct SaleCommandService<P, L, S, B> {
    products: P,
    ledger: L,
    stock: StockValidator<P, L>,
    sales: S,
    bus: B,
}

impl<P, L, S, B> SaleCommandService<P, L, S, B>
where
    P: ProductRepository + Clone,
    L: LedgerRepository + Clone,
    S: SaleRepository,
    B: EventBus<EventEnvelope<SaleEvent>>,
{
    pub fn new(products: P, ledger: L, sales: S, bus: B) -> Self {
        Self {
            stock: StockValidator::new(products.clone(), ledger.clone()),
            products,
            ledger,
            sales,
            bus,
        }
    }

    /// Build the draft, check stock, confirm, commit, publish.
    pub fn confirm(&self, command: &ConfirmSale) -> Result<SaleReceipt, DispatchError> {
        let mut sale = Sale::draft(SaleHeader {
            customer_id: command.customer_id,
            warehouse_id: command.warehouse_id,
            cash_session_id: command.cash_session_id,
            payment_method: command.payment_method,
        });

        let mut requested: BTreeMap<_, Quantity> = BTreeMap::new();
        // Tracked products and the cost their stock is valued at.
        let mut tracked = HashMap::new();
        for input in &command.lines {
            let product = self
                .products
                .find_by_id(input.product_id)?
                .ok_or_else(|| DispatchError::NotFound(format!("product {}", input.product_id)))?;

            let unit_price = input.unit_price.unwrap_or(product.base_price);
            sale.add_taxed_line(product.id, input.quantity, unit_price, product.tax_percentage)?;

            let total = requested.entry(product.id).or_default();
            *total = total.checked_add(input.quantity).ok_or_else(|| {
                DispatchError::Validation(format!("quantity of product {} out of range", product.id))
            })?;
            if product.tracks_stock {
                tracked.insert(product.id, product.standard_cost);
            }
        }

        // Whole-sale quantities, so two lines of one product are checked together.
        for (product_id, quantity) in &requested {
            self.stock
                .check_availability(command.warehouse_id, *product_id, *quantity)?;
        }

        let sale_id = self.sales.next_id();
        let created = sale.confirm(sale_id, command.actor, command.occurred_at)?;

        let reference = MovementReference::new(SALE_MOVEMENT_REFERENCE, *sale_id.0.as_uuid());
        let movements = sale
            .lines()
            .iter()
            .filter_map(|line| {
                let unit_cost = tracked.get(&line.product_id)?;
                Some(NewMovement::sale(
                    StockKey::new(command.warehouse_id, line.product_id),
                    line.quantity,
                    *unit_cost,
                    reference.clone(),
                    command.occurred_at,
                ))
            })
            .collect();

        let metadata = EventMetadata::new(command.actor, command.command_id);
        let envelopes = self.commit(&sale, SaleEvent::SaleCreated(created), movements, metadata)?;
        self.publish(&envelopes);

        tracing::debug!(
            %sale_id,
            total = %sale.total(),
            lines = sale.lines().len(),
            "sale confirmed"
        );
        Ok(receipt(sale_id, &sale))
    }

    /// Void a confirmed sale and put its stock back.
    ///
    /// Reversals mirror the `SALE` movements actually recorded for the sale,
    /// so lines that never touched the ledger are not reversed.
    pub fn void(&self, command: &VoidSale) -> Result<SaleReceipt, DispatchError> {
        let mut sale = self
            .sales
            .find_by_id(command.sale_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("sale {}", command.sale_id)))?;

        let voided = sale.void(command.reason.clone(), command.actor, command.occurred_at)?;

        let sale_ref = *command.sale_id.0.as_uuid();
        let reference = MovementReference::new(VOID_MOVEMENT_REFERENCE, sale_ref);
        let warehouse_id = sale.header().warehouse_id;
        let keys: BTreeSet<StockKey> = sale
            .lines()
            .iter()
            .map(|line| StockKey::new(warehouse_id, line.product_id))
            .collect();

        let mut movements = Vec::new();
        for key in keys {
            for taken in self.ledger.movements(key)? {
                let ours = taken.movement_type == MovementType::Sale
                    && taken.reference.reference_type == SALE_MOVEMENT_REFERENCE
                    && taken.reference.reference_id == sale_ref;
                if ours {
                    movements.push(NewMovement::void_reversal(
                        key,
                        taken.quantity_delta.abs(),
                        taken.unit_cost,
                        reference.clone(),
                        command.occurred_at,
                    ));
                }
            }
        }

        let metadata = EventMetadata::new(command.actor, command.command_id);
        let envelopes = self.commit(&sale, SaleEvent::SaleVoided(voided), movements, metadata)?;
        self.publish(&envelopes);

        tracing::debug!(sale_id = %command.sale_id, reason = %command.reason, "sale voided");
        Ok(receipt(command.sale_id, &sale))
    }

    /// Append `event` and apply `movements` as one unit.
    fn commit(
        &self,
        sale: &Sale,
        event: SaleEvent,
        movements: Vec<NewMovement>,
        metadata: EventMetadata,
    ) -> Result<Vec<EventEnvelope<SaleEvent>>, DispatchError> {
        let changes = [event];
        let mut committed = None;
        let mut rejected = None;

        let applied = self.ledger.register_batch(movements, &mut || {
            match self.sales.save(sale, &changes, metadata) {
                Ok(envelopes) => {
                    committed = Some(envelopes);
                    Ok(())
                }
                Err(err) => {
                    let reason = err.to_string();
                    rejected = Some(err);
                    Err(LedgerError::Aborted(reason))
                }
            }
        });

        if let Some(err) = rejected {
            return Err(err.into());
        }
        let applied = applied?;

        let envelopes = committed.ok_or_else(|| {
            DispatchError::InvariantViolation("ledger batch skipped the event append".to_string())
        })?;
        tracing::debug!(
            events = envelopes.len(),
            movements = applied.len(),
            "sale change committed"
        );
        Ok(envelopes)
    }

    fn publish(&self, envelopes: &[EventEnvelope<SaleEvent>]) {
        for envelope in envelopes {
            if let Err(err) = self.bus.publish(envelope.clone()) {
                // Already durable; consumers catch up from the store.
                tracing::error!(
                    error = ?err,
                    event_type = envelope.event_type(),
                    sequence = envelope.sequence(),
                    "failed to publish sale event"
                );
            }
        }
    }
}

fn receipt(sale_id: SaleId, sale: &Sale) -> SaleReceipt {
    SaleReceipt {
        sale_id,
        status: sale.status(),
        total: sale.total(),
        stream_version: sale.version(),
    }
}

/// Handles [`SalesCommand::Confirm`].
#[derive(Debug)]
pub struct ConfirmSaleHandler<P, L, S, B> {
    service: Arc<SaleCommandService<P, L, S, B>>,
}

impl<P, L, S, B> ConfirmSaleHandler<P, L, S, B> {
    pub fn new(service: Arc<SaleCommandService<P, L, S, B>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<P, L, S, B> CommandHandler<SalesCommand, SaleReceipt> for ConfirmSaleHandler<P, L, S, B>
where
    P: ProductRepository + Clone,
    L: LedgerRepository + Clone,
    S: SaleRepository,
    B: EventBus<EventEnvelope<SaleEvent>>,
{
    async fn handle(&self, command: SalesCommand) -> Result<SaleReceipt, DispatchError> {
        match command {
            SalesCommand::Confirm(confirm) => self.service.confirm(&confirm),
            other => Err(DispatchError::UnregisteredHandler(
                other.command_type().to_string(),
            )),
        }
    }
}

/// Handles [`SalesCommand::Void`].
#[derive(Debug)]
pub struct VoidSaleHandler<P, L, S, B> {
    service: Arc<SaleCommandService<P, L, S, B>>,
}

impl<P, L, S, B> VoidSaleHandler<P, L, S, B> {
    pub fn new(service: Arc<SaleCommandService<P, L, S, B>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<P, L, S, B> CommandHandler<SalesCommand, SaleReceipt> for VoidSaleHandler<P, L, S, B>
where
    P: ProductRepository + Clone,
    L: LedgerRepository + Clone,
    S: SaleRepository,
    B: EventBus<EventEnvelope<SaleEvent>>,
{
    async fn handle(&self, command: SalesCommand) -> Result<SaleReceipt, DispatchError> {
        match command {
            SalesCommand::Void(void) => self.service.void(&void),
            other => Err(DispatchError::UnregisteredHandler(
                other.command_type().to_string(),
            )),
        }
    }
}
