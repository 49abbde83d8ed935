//! Books journal entries for sale facts, off the request path.

use chrono::NaiveDate;
use thiserror::Error;

use kardex_accounting::{
    AccountingError, AccountingRepository, ChartOfAccounts, EntryId, JournalEntry, ORIGIN_SALE,
    ORIGIN_SALE_VOID, PeriodResolver, sale_entry, split_sale, void_entry,
};
use kardex_events::EventEnvelope;
use kardex_sales::{Sale, SaleEvent, SaleId, SaleRepository, SaleRepositoryError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Sales(#[from] SaleRepositoryError),

    #[error("sale {0} not found")]
    SaleNotFound(SaleId),
}

/// What a booking request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(EntryId),
    /// An entry for the same origin already existed; nothing was written.
    AlreadyBooked(EntryId),
}

impl BookingOutcome {
    pub fn entry_id(&self) -> EntryId {
        match self {
            BookingOutcome::Booked(id) | BookingOutcome::AlreadyBooked(id) => *id,
        }
    }
}

/// Accounting engine.
///
/// Every entry is keyed by `(origin_module, origin_id)`; re-delivered
/// notifications find the existing entry and book nothing. Amounts come from
/// the sale's own snapshot, tax rates included, so a later booking matches
/// the sale as it was rung up. Failures here never affect the sale that
/// triggered them.
#[derive(Debug)]
pub struct AccountingEngine<J, P, S> {
    journal: J,
    periods: P,
    sales: S,
    accounts: ChartOfAccounts,
    default_period: String,
}

impl<J, P, S> AccountingEngine<J, P, S>
where
    J: AccountingRepository,
    P: PeriodResolver,
    S: SaleRepository,
{
    pub fn new(
        journal: J,
        periods: P,
        sales: S,
        accounts: ChartOfAccounts,
        default_period: impl Into<String>,
    ) -> Self {
        Self {
            journal,
            periods,
            sales,
            accounts,
            default_period: default_period.into(),
        }
    }

    /// React to a committed sale event.
    pub fn handle(&self, envelope: &EventEnvelope<SaleEvent>) -> Result<BookingOutcome, EngineError> {
        match envelope.payload() {
            SaleEvent::SaleCreated(e) => self.create_entry_for_sale(e.sale_id),
            SaleEvent::SaleVoided(e) => self.create_entry_for_void(e.sale_id),
        }
    }

    /// Book the entry of a confirmed sale.
    pub fn create_entry_for_sale(&self, sale_id: SaleId) -> Result<BookingOutcome, EngineError> {
        if let Some(existing) = self.already_booked(ORIGIN_SALE, sale_id)? {
            return Ok(existing);
        }

        let sale = self.load(sale_id)?;
        let date = sale
            .confirmed_at()
            .map(|at| at.date_naive())
            .ok_or_else(|| {
                AccountingError::InvalidLine(format!("sale {sale_id} has no confirmation date"))
            })?;
        let period = self.period_for(date)?;

        let entry = sale_entry(&sale, split_sale(sale.lines()), &self.accounts, period)?;
        self.book(entry)
    }

    /// Book the reversal of a voided sale's entry.
    ///
    /// If the original entry is missing (its booking failed earlier), it is
    /// booked first so the reversal has something to mirror.
    pub fn create_entry_for_void(&self, sale_id: SaleId) -> Result<BookingOutcome, EngineError> {
        if let Some(existing) = self.already_booked(ORIGIN_SALE_VOID, sale_id)? {
            return Ok(existing);
        }

        let original = match self.journal.find_by_origin(ORIGIN_SALE, *sale_id.0.as_uuid())? {
            Some(entry) => entry,
            None => {
                self.create_entry_for_sale(sale_id)?;
                self.journal
                    .find_by_origin(ORIGIN_SALE, *sale_id.0.as_uuid())?
                    .ok_or_else(|| {
                        AccountingError::MissingReference(format!("entry of sale {sale_id}"))
                    })?
            }
        };

        let sale = self.load(sale_id)?;
        let date = sale
            .voided_at()
            .map(|at| at.date_naive())
            .ok_or_else(|| AccountingError::InvalidLine(format!("sale {sale_id} is not voided")))?;
        let period = self.period_for(date)?;

        let entry = void_entry(&original, &sale, period)?;
        self.book(entry)
    }

    fn load(&self, sale_id: SaleId) -> Result<Sale, EngineError> {
        self.sales
            .find_by_id(sale_id)?
            .ok_or(EngineError::SaleNotFound(sale_id))
    }

    fn already_booked(
        &self,
        origin_module: &str,
        sale_id: SaleId,
    ) -> Result<Option<BookingOutcome>, AccountingError> {
        let existing = self
            .journal
            .find_by_origin(origin_module, *sale_id.0.as_uuid())?;

        Ok(existing.map(|entry| {
            tracing::warn!(
                origin_module,
                %sale_id,
                entry_id = %entry.header().id,
                "entry already booked; duplicate delivery ignored"
            );
            BookingOutcome::AlreadyBooked(entry.header().id)
        }))
    }

    fn period_for(&self, date: NaiveDate) -> Result<String, AccountingError> {
        match self.periods.resolve(date)? {
            Some(period) => Ok(period),
            None => {
                tracing::warn!(
                    %date,
                    period = %self.default_period,
                    "no accounting period covers date; using default period"
                );
                Ok(self.default_period.clone())
            }
        }
    }

    fn book(&self, entry: JournalEntry) -> Result<BookingOutcome, EngineError> {
        let id = entry.header().id;
        let origin_module = entry.header().origin_module.clone();
        let origin_id = entry.header().origin_id;

        match self.journal.create_entry(entry) {
            Ok(()) => {
                tracing::debug!(%id, %origin_module, %origin_id, "journal entry booked");
                Ok(BookingOutcome::Booked(id))
            }
            // Lost a race with another delivery of the same fact.
            Err(AccountingError::DuplicateOrigin { .. }) => {
                tracing::warn!(%origin_module, %origin_id, "entry booked concurrently; keeping the first");
                let existing = self
                    .journal
                    .find_by_origin(&origin_module, origin_id)?
                    .map(|e| e.header().id)
                    .unwrap_or(id);
                Ok(BookingOutcome::AlreadyBooked(existing))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use kardex_core::{CashSessionId, Money, ProductId, Quantity, UserId, WarehouseId};
    use kardex_events::EventMetadata;
    use kardex_sales::{PaymentMethod, SaleHeader};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::accounting::{InMemoryJournal, MonthlyPeriods};
    use crate::event_store::InMemoryEventStore;
    use crate::sale_repository::EventSourcedSaleRepository;

    type Sales = EventSourcedSaleRepository<Arc<InMemoryEventStore>>;
    type Engine = AccountingEngine<Arc<InMemoryJournal>, MonthlyPeriods, Arc<Sales>>;

    struct Fixture {
        journal: Arc<InMemoryJournal>,
        sales: Arc<Sales>,
        product: ProductId,
    }

    fn fixture() -> Fixture {
        Fixture {
            journal: Arc::new(InMemoryJournal::new()),
            sales: Arc::new(EventSourcedSaleRepository::new(Arc::new(InMemoryEventStore::new()))),
            product: ProductId::new(),
        }
    }

    fn engine(f: &Fixture, periods: MonthlyPeriods) -> Engine {
        AccountingEngine::new(
            Arc::clone(&f.journal),
            periods,
            Arc::clone(&f.sales),
            ChartOfAccounts::default(),
            "DEFAULT",
        )
    }

    fn confirm(f: &Fixture, method: PaymentMethod) -> SaleId {
        let mut sale = Sale::draft(SaleHeader {
            customer_id: None,
            warehouse_id: WarehouseId::new(),
            cash_session_id: CashSessionId::new(),
            payment_method: method,
        });
        sale.add_taxed_line(f.product, Quantity::from(1), Money::new(dec!(118.00)), dec!(18))
            .unwrap();
        let id = f.sales.next_id();
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let created = sale.confirm(id, UserId::new(), at).unwrap();
        f.sales
            .save(
                &sale,
                &[SaleEvent::SaleCreated(created)],
                EventMetadata::new(UserId::new(), Uuid::now_v7()),
            )
            .unwrap();
        id
    }

    #[test]
    fn sale_is_booked_once() {
        let f = fixture();
        let engine = engine(&f, MonthlyPeriods::every_month());
        let id = confirm(&f, PaymentMethod::Cash);

        let first = engine.create_entry_for_sale(id).unwrap();
        let again = engine.create_entry_for_sale(id).unwrap();

        assert!(matches!(first, BookingOutcome::Booked(_)));
        assert_eq!(again, BookingOutcome::AlreadyBooked(first.entry_id()));

        let entries = f.journal.entries().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.header().period, "2026-10");
        assert_eq!(entry.account_totals("1101").0, Money::new(dec!(118.00)));
        assert_eq!(entry.account_totals("4101").1, Money::new(dec!(100.00)));
        assert_eq!(entry.account_totals("2401").1, Money::new(dec!(18.00)));
        assert_eq!(entry.total_debit(), entry.total_credit());
    }

    #[test]
    fn unresolved_period_falls_back_to_default() {
        let f = fixture();
        let engine = engine(&f, MonthlyPeriods::only(["2020-01"]));
        let id = confirm(&f, PaymentMethod::Credit);

        engine.create_entry_for_sale(id).unwrap();

        let entry = f
            .journal
            .find_by_origin(ORIGIN_SALE, *id.0.as_uuid())
            .unwrap()
            .unwrap();
        assert_eq!(entry.header().period, "DEFAULT");
        assert_eq!(entry.account_totals("1201").0, Money::new(dec!(118.00)));
    }

    #[test]
    fn unknown_sale_is_reported() {
        let f = fixture();
        let engine = engine(&f, MonthlyPeriods::every_month());
        let id = f.sales.next_id();
        match engine.create_entry_for_sale(id).unwrap_err() {
            EngineError::SaleNotFound(missing) => assert_eq!(missing, id),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn void_books_a_mirror_entry_even_if_the_sale_was_never_booked() {
        let f = fixture();
        let engine = engine(&f, MonthlyPeriods::every_month());
        let id = confirm(&f, PaymentMethod::Cash);

        let mut sale = f.sales.find_by_id(id).unwrap().unwrap();
        let voided = sale.void("wrong customer", UserId::new(), Utc::now()).unwrap();
        f.sales
            .save(
                &sale,
                &[SaleEvent::SaleVoided(voided)],
                EventMetadata::new(UserId::new(), Uuid::now_v7()),
            )
            .unwrap();

        let outcome = engine.create_entry_for_void(id).unwrap();
        assert!(matches!(outcome, BookingOutcome::Booked(_)));
        assert!(matches!(
            engine.create_entry_for_void(id).unwrap(),
            BookingOutcome::AlreadyBooked(_)
        ));

        let entries = f.journal.entries().unwrap();
        assert_eq!(entries.len(), 2);
        let (booked, reversal) = (&entries[0], &entries[1]);
        assert_eq!(booked.header().origin_module, ORIGIN_SALE);
        assert_eq!(reversal.header().origin_module, ORIGIN_SALE_VOID);
        assert_eq!(reversal.account_totals("1101").1, Money::new(dec!(118.00)));
    }
}
