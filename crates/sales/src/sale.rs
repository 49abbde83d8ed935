use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_core::{
    Aggregate, AggregateId, AggregateRoot, CashSessionId, CustomerId, DomainError, DomainResult,
    Money, ProductId, Quantity, UserId, WarehouseId,
};

use crate::events::{SaleCreated, SaleEvent, SaleVoided};

/// Sale identifier. Assigned when the sale is confirmed and committed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sale lifecycle: `Draft → Confirmed → Void`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Draft,
    Confirmed,
    Void,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Draft => "DRAFT",
            SaleStatus::Confirmed => "CONFIRMED",
            SaleStatus::Void => "VOID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// On account; settled later against the customer's receivable.
    Credit,
}

/// One sale line. Immutable once attached to a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// Tax rate included in `unit_price`, in percent, as it was at sale time.
    pub tax_percentage: Decimal,
    /// `round(quantity × unit_price, 2)`.
    pub subtotal: Money,
}

impl SaleLine {
    fn new(
        line_no: u32,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Money,
        tax_percentage: Decimal,
    ) -> DomainResult<Self> {
        if !quantity.is_positive() {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit_price must not be negative"));
        }
        if tax_percentage.is_sign_negative() {
            return Err(DomainError::validation("tax_percentage must not be negative"));
        }
        let subtotal = unit_price.checked_times(quantity).ok_or_else(|| {
            DomainError::validation(format!(
                "line amount out of range ({quantity} × {unit_price})"
            ))
        })?;

        Ok(Self {
            line_no,
            product_id,
            quantity,
            unit_price,
            tax_percentage,
            subtotal,
        })
    }
}

/// Header data chosen when the sale is opened at the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleHeader {
    pub customer_id: Option<CustomerId>,
    pub warehouse_id: WarehouseId,
    pub cash_session_id: CashSessionId,
    pub payment_method: PaymentMethod,
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: Option<SaleId>,
    header: SaleHeader,
    status: SaleStatus,
    lines: Vec<SaleLine>,
    total: Money,
    confirmed_by: Option<UserId>,
    confirmed_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Sale {
    /// Open a new draft sale (no id yet, no lines).
    pub fn draft(header: SaleHeader) -> Self {
        Self {
            id: None,
            header,
            status: SaleStatus::Draft,
            lines: Vec::new(),
            total: Money::zero(),
            confirmed_by: None,
            confirmed_at: None,
            void_reason: None,
            voided_at: None,
            version: 0,
        }
    }

    /// Blank instance for rehydration from a stored stream.
    pub fn empty() -> Self {
        Self::draft(SaleHeader {
            customer_id: None,
            warehouse_id: WarehouseId::from_uuid(Uuid::nil()),
            cash_session_id: CashSessionId::from_uuid(Uuid::nil()),
            payment_method: PaymentMethod::Cash,
        })
    }

    /// Rebuild a sale by applying its stored events in order.
    pub fn from_history<'a>(events: impl IntoIterator<Item = &'a SaleEvent>) -> Option<Self> {
        let mut sale = Self::empty();
        for ev in events {
            sale.apply(ev);
        }
        sale.id.map(|_| sale)
    }

    pub fn id_typed(&self) -> Option<SaleId> {
        self.id
    }

    pub fn header(&self) -> &SaleHeader {
        &self.header
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn confirmed_by(&self) -> Option<UserId> {
        self.confirmed_by
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SaleStatus::Draft)
    }

    /// Append an untaxed line to a draft.
    pub fn add_line(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Money,
    ) -> DomainResult<&SaleLine> {
        self.add_taxed_line(product_id, quantity, unit_price, Decimal::ZERO)
    }

    /// Append a line whose price includes `tax_percentage` and grow the total.
    ///
    /// A line whose amount (or the resulting total) does not fit in a decimal
    /// is rejected and leaves the draft unchanged.
    pub fn add_taxed_line(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Money,
        tax_percentage: Decimal,
    ) -> DomainResult<&SaleLine> {
        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "cannot modify a sale once it is confirmed or voided",
            ));
        }

        let line_no = (self.lines.len() as u32) + 1;
        let line = SaleLine::new(line_no, product_id, quantity, unit_price, tax_percentage)?;
        let total = self
            .total
            .checked_add(line.subtotal)
            .ok_or_else(|| DomainError::validation("sale total out of range"))?;

        self.lines.push(line);
        self.total = total;
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Confirm the draft under `sale_id`. Returns the emitted event.
    pub fn confirm(
        &mut self,
        sale_id: SaleId,
        user_id: UserId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<SaleCreated> {
        let cmd = SaleCommand::Confirm(ConfirmDraft {
            sale_id,
            user_id,
            occurred_at,
        });
        match single(kardex_events::execute(self, &cmd)?)? {
            SaleEvent::SaleCreated(e) => Ok(e),
            SaleEvent::SaleVoided(_) => Err(DomainError::invariant("confirm emitted a void")),
        }
    }

    /// Void a confirmed sale. Returns the emitted compensating event.
    pub fn void(
        &mut self,
        reason: impl Into<String>,
        user_id: UserId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<SaleVoided> {
        let cmd = SaleCommand::Void(VoidConfirmed {
            reason: reason.into(),
            user_id,
            occurred_at,
        });
        match single(kardex_events::execute(self, &cmd)?)? {
            SaleEvent::SaleVoided(e) => Ok(e),
            SaleEvent::SaleCreated(_) => Err(DomainError::invariant("void emitted a creation")),
        }
    }
}

fn single(mut events: Vec<SaleEvent>) -> DomainResult<SaleEvent> {
    match (events.pop(), events.is_empty()) {
        (Some(ev), true) => Ok(ev),
        _ => Err(DomainError::invariant("expected exactly one sale event")),
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> Option<&Self::Id> {
        self.id.as_ref()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: confirm a draft sale under a freshly allocated id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDraft {
    pub sale_id: SaleId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: void a confirmed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidConfirmed {
    pub reason: String,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    Confirm(ConfirmDraft),
    Void(VoidConfirmed),
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleCreated(e) => {
                self.id = Some(e.sale_id);
                self.header = SaleHeader {
                    customer_id: e.customer_id,
                    warehouse_id: e.warehouse_id,
                    cash_session_id: e.cash_session_id,
                    payment_method: e.payment_method,
                };
                self.lines = e.lines.clone();
                self.total = e.total;
                self.confirmed_by = Some(e.user_id);
                self.confirmed_at = Some(e.occurred_at);
                self.status = SaleStatus::Confirmed;
            }
            SaleEvent::SaleVoided(e) => {
                self.status = SaleStatus::Void;
                self.void_reason = Some(e.reason.clone());
                self.voided_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::Confirm(cmd) => self.handle_confirm(cmd),
            SaleCommand::Void(cmd) => self.handle_void(cmd),
        }
    }
}

impl Sale {
    fn handle_confirm(&self, cmd: &ConfirmDraft) -> Result<Vec<SaleEvent>, DomainError> {
        if self.status != SaleStatus::Draft {
            return Err(DomainError::invalid_transition(
                self.status,
                SaleStatus::Confirmed,
            ));
        }

        if self.lines.is_empty() {
            return Err(DomainError::EmptySale);
        }

        if !self.total.is_positive() {
            return Err(DomainError::InvalidTotal { total: self.total });
        }

        Ok(vec![SaleEvent::SaleCreated(SaleCreated {
            sale_id: cmd.sale_id,
            customer_id: self.header.customer_id,
            warehouse_id: self.header.warehouse_id,
            cash_session_id: self.header.cash_session_id,
            payment_method: self.header.payment_method,
            user_id: cmd.user_id,
            lines: self.lines.clone(),
            total: self.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidConfirmed) -> Result<Vec<SaleEvent>, DomainError> {
        let Some(sale_id) = self.id else {
            return Err(DomainError::invalid_transition(self.status, SaleStatus::Void));
        };

        if self.status != SaleStatus::Confirmed {
            return Err(DomainError::invalid_transition(self.status, SaleStatus::Void));
        }

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("void reason is required"));
        }

        Ok(vec![SaleEvent::SaleVoided(SaleVoided {
            sale_id,
            reason: cmd.reason.clone(),
            voided_by: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_header() -> SaleHeader {
        SaleHeader {
            customer_id: Some(CustomerId::new()),
            warehouse_id: WarehouseId::new(),
            cash_session_id: CashSessionId::new(),
            payment_method: PaymentMethod::Cash,
        }
    }

    fn test_sale_id() -> SaleId {
        SaleId::new(AggregateId::new())
    }

    fn money(v: Decimal) -> Money {
        Money::new(v)
    }

    fn confirmed_sale() -> Sale {
        let mut sale = Sale::draft(test_header());
        sale.add_line(ProductId::new(), Quantity::from(5), money(dec!(100)))
            .unwrap();
        sale.add_line(ProductId::new(), Quantity::from(2), money(dec!(50)))
            .unwrap();
        sale.confirm(test_sale_id(), UserId::new(), Utc::now()).unwrap();
        sale
    }

    #[test]
    fn two_line_example_totals_six_hundred() {
        let mut sale = Sale::draft(test_header());
        sale.add_line(ProductId::new(), Quantity::from(5), money(dec!(100.00)))
            .unwrap();
        sale.add_line(ProductId::new(), Quantity::from(2), money(dec!(50.00)))
            .unwrap();

        assert_eq!(sale.total(), money(dec!(600.00)));
        assert_eq!(sale.lines()[0].subtotal, money(dec!(500)));
        assert_eq!(sale.lines()[1].line_no, 2);
    }

    #[test]
    fn subtotal_is_rounded_to_cents() {
        let mut sale = Sale::draft(test_header());
        let line = sale
            .add_line(ProductId::new(), Quantity::new(dec!(0.333)), money(dec!(10.00)))
            .unwrap();
        assert_eq!(line.subtotal, money(dec!(3.33)));
    }

    #[test]
    fn rejects_non_positive_quantity_and_negative_price() {
        let mut sale = Sale::draft(test_header());
        let err = sale
            .add_line(ProductId::new(), Quantity::zero(), money(dec!(1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = sale
            .add_line(ProductId::new(), Quantity::from(1), money(dec!(-1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = sale
            .add_taxed_line(ProductId::new(), Quantity::from(1), money(dec!(1)), dec!(-5))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(sale.lines().is_empty());
    }

    #[test]
    fn oversized_amounts_are_rejected_without_touching_the_draft() {
        let mut sale = Sale::draft(test_header());
        let err = sale
            .add_line(ProductId::new(), Quantity::new(Decimal::MAX), money(dec!(100)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(sale.lines().is_empty());

        let huge = Money::new(Decimal::MAX);
        sale.add_line(ProductId::new(), Quantity::from(1), huge).unwrap();
        let err = sale
            .add_line(ProductId::new(), Quantity::from(1), huge)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("total")));
        assert_eq!(sale.lines().len(), 1);
        assert_eq!(sale.total(), huge);
    }

    #[test]
    fn taxed_lines_keep_their_rate_in_the_snapshot() {
        let mut sale = Sale::draft(test_header());
        sale.add_taxed_line(ProductId::new(), Quantity::from(1), money(dec!(118)), dec!(18))
            .unwrap();
        sale.add_line(ProductId::new(), Quantity::from(1), money(dec!(10)))
            .unwrap();

        let created = sale.confirm(test_sale_id(), UserId::new(), Utc::now()).unwrap();
        assert_eq!(created.lines[0].tax_percentage, dec!(18));
        assert_eq!(created.lines[1].tax_percentage, Decimal::ZERO);
    }

    #[test]
    fn confirming_empty_sale_fails() {
        let mut sale = Sale::draft(test_header());
        let err = sale
            .confirm(test_sale_id(), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::EmptySale);
        assert_eq!(sale.status(), SaleStatus::Draft);
        assert_eq!(sale.version(), 0);
    }

    #[test]
    fn confirming_zero_total_fails() {
        let mut sale = Sale::draft(test_header());
        sale.add_line(ProductId::new(), Quantity::from(3), Money::zero())
            .unwrap();
        let err = sale
            .confirm(test_sale_id(), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTotal {
                total: Money::zero()
            }
        );
    }

    #[test]
    fn confirm_emits_full_snapshot_and_assigns_id() {
        let header = test_header();
        let mut sale = Sale::draft(header);
        sale.add_line(ProductId::new(), Quantity::from(1), money(dec!(9.99)))
            .unwrap();
        assert!(sale.id().is_none());

        let sale_id = test_sale_id();
        let user = UserId::new();
        let created = sale.confirm(sale_id, user, Utc::now()).unwrap();

        assert_eq!(created.sale_id, sale_id);
        assert_eq!(created.warehouse_id, header.warehouse_id);
        assert_eq!(created.customer_id, header.customer_id);
        assert_eq!(created.payment_method, PaymentMethod::Cash);
        assert_eq!(created.user_id, user);
        assert_eq!(created.lines, sale.lines());
        assert_eq!(created.total, money(dec!(9.99)));

        assert_eq!(sale.id(), Some(&sale_id));
        assert_eq!(sale.status(), SaleStatus::Confirmed);
        assert_eq!(sale.version(), 1);
    }

    #[test]
    fn cannot_modify_confirmed_sale() {
        let mut sale = confirmed_sale();
        let err = sale
            .add_line(ProductId::new(), Quantity::from(1), money(dec!(1)))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg)
                if msg.contains("cannot modify a sale once it is confirmed") => {}
            _ => panic!("Expected InvariantViolation for modifying confirmed sale"),
        }
    }

    #[test]
    fn cannot_confirm_twice() {
        let mut sale = confirmed_sale();
        let err = sale
            .confirm(test_sale_id(), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn void_only_from_confirmed() {
        let mut draft = Sale::draft(test_header());
        let err = draft.void("typo", UserId::new(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "Draft".into(),
                to: "Void".into()
            }
        );

        let mut sale = confirmed_sale();
        let voided = sale.void("wrong item", UserId::new(), Utc::now()).unwrap();
        assert_eq!(Some(&voided.sale_id), sale.id());
        assert_eq!(sale.status(), SaleStatus::Void);
        assert_eq!(sale.void_reason(), Some("wrong item"));
        assert_eq!(sale.version(), 2);

        let err = sale.void("again", UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn void_requires_reason() {
        let mut sale = confirmed_sale();
        let err = sale.void("  ", UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(sale.status(), SaleStatus::Confirmed);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let sale = confirmed_sale();
        let cmd = SaleCommand::Void(VoidConfirmed {
            reason: "duplicate".into(),
            user_id: UserId::new(),
            occurred_at: Utc::now(),
        });

        let events1 = sale.handle(&cmd).unwrap();
        let events2 = sale.handle(&cmd).unwrap();

        assert_eq!(events1, events2);
        assert_eq!(sale.status(), SaleStatus::Confirmed);
        assert_eq!(sale.version(), 1);
    }

    #[test]
    fn history_rebuilds_identical_state() {
        let mut sale = Sale::draft(test_header());
        sale.add_line(ProductId::new(), Quantity::from(4), money(dec!(2.50)))
            .unwrap();
        let created = sale.confirm(test_sale_id(), UserId::new(), Utc::now()).unwrap();
        let voided = sale.void("expired", UserId::new(), Utc::now()).unwrap();

        let history = [SaleEvent::SaleCreated(created), SaleEvent::SaleVoided(voided)];
        let rebuilt = Sale::from_history(&history).unwrap();

        assert_eq!(rebuilt, sale);
        assert!(Sale::from_history(Vec::<SaleEvent>::new().iter()).is_none());
    }

    fn arb_line() -> impl Strategy<Value = (i64, i64)> {
        // (quantity in thousandths, unit price in cents)
        (1i64..100_000, 0i64..1_000_000)
    }

    proptest! {
        #[test]
        fn total_always_equals_sum_of_rounded_subtotals(lines in prop::collection::vec(arb_line(), 1..20)) {
            let mut sale = Sale::draft(test_header());
            for (qty_milli, price_cents) in &lines {
                let quantity = Quantity::new(Decimal::new(*qty_milli, 3));
                let unit_price = Money::from_minor(*price_cents);
                sale.add_line(ProductId::new(), quantity, unit_price).unwrap();
            }

            let mut expected = Money::zero();
            for line in sale.lines() {
                let exact = line.quantity.value() * line.unit_price.amount();
                prop_assert_eq!(line.subtotal, Money::new(exact));
                expected = expected + line.subtotal;
            }
            prop_assert_eq!(sale.total(), expected);

            let total_positive = sale.total().is_positive();
            let result = sale.confirm(test_sale_id(), UserId::new(), Utc::now());
            prop_assert_eq!(result.is_ok(), total_positive);
            if let Ok(created) = result {
                let sum: Money = created.lines.iter().map(|l| l.subtotal).sum();
                prop_assert_eq!(created.total, sum);
            }
        }
    }
}
