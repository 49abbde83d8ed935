//! Posting rules: how sale facts become journal entries.

use serde::{Deserialize, Serialize};

use kardex_core::Money;
use kardex_sales::{PaymentMethod, Sale, SaleLine, SaleStatus};

use crate::error::AccountingError;
use crate::journal::{AccountingEntry, AccountingLine, EntryId, JournalEntry};

/// Origin module of entries booked for a confirmed sale.
pub const ORIGIN_SALE: &str = "sales.sale";
/// Origin module of the reversal booked when a sale is voided.
pub const ORIGIN_SALE_VOID: &str = "sales.void";

/// Account codes used by the sale posting rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub cash: String,
    pub receivable: String,
    pub revenue: String,
    pub tax_payable: String,
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self {
            cash: "1101".to_string(),
            receivable: "1201".to_string(),
            revenue: "4101".to_string(),
            tax_payable: "2401".to_string(),
        }
    }
}

impl ChartOfAccounts {
    /// Account debited for a sale paid with `method`.
    pub fn settlement_account(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Cash | PaymentMethod::Card => &self.cash,
            PaymentMethod::Credit => &self.receivable,
        }
    }
}

/// Tax-inclusive totals of a sale: `total == subtotal + tax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleAmounts {
    pub total: Money,
    /// Pre-tax amount (revenue).
    pub subtotal: Money,
    pub tax: Money,
}

/// Split sale lines into net and tax at the rate each line was sold with.
///
/// Prices are tax-inclusive; the split is done per line and summed.
pub fn split_sale(lines: &[SaleLine]) -> SaleAmounts {
    let mut amounts = SaleAmounts {
        total: Money::zero(),
        subtotal: Money::zero(),
        tax: Money::zero(),
    };

    for line in lines {
        let (net, tax) = line.subtotal.split_inclusive_tax(line.tax_percentage);
        amounts.total = amounts.total + line.subtotal;
        amounts.subtotal = amounts.subtotal + net;
        amounts.tax = amounts.tax + tax;
    }

    amounts
}

/// Journal entry for a confirmed sale.
///
/// Debit settlement account = total; credit revenue = subtotal; credit tax
/// payable = tax (only when tax > 0).
pub fn sale_entry(
    sale: &Sale,
    amounts: SaleAmounts,
    accounts: &ChartOfAccounts,
    period: String,
) -> Result<JournalEntry, AccountingError> {
    let (Some(sale_id), Some(confirmed_at)) = (sale.id_typed(), sale.confirmed_at()) else {
        return Err(AccountingError::InvalidLine(
            "cannot book a sale that was never confirmed".to_string(),
        ));
    };

    if amounts.total != sale.total() {
        return Err(AccountingError::InvalidLine(format!(
            "line totals {} do not match sale total {}",
            amounts.total,
            sale.total()
        )));
    }

    let header = AccountingEntry {
        id: EntryId::new(),
        period,
        date: confirmed_at.date_naive(),
        concept: format!("Sale {sale_id}"),
        origin_module: ORIGIN_SALE.to_string(),
        origin_id: *sale_id.0.as_uuid(),
    };
    let id = header.id;

    let mut lines = vec![
        AccountingLine::debit(
            id,
            accounts.settlement_account(sale.header().payment_method),
            amounts.total,
        ),
        AccountingLine::credit(id, &accounts.revenue, amounts.subtotal),
    ];
    if amounts.tax.is_positive() {
        lines.push(AccountingLine::credit(id, &accounts.tax_payable, amounts.tax));
    }

    JournalEntry::new(header, lines)
}

/// Reversal of a sale's entry once the sale is voided.
pub fn void_entry(
    original: &JournalEntry,
    sale: &Sale,
    period: String,
) -> Result<JournalEntry, AccountingError> {
    let (Some(sale_id), Some(voided_at), SaleStatus::Void) =
        (sale.id_typed(), sale.voided_at(), sale.status())
    else {
        return Err(AccountingError::InvalidLine(
            "cannot reverse a sale that is not voided".to_string(),
        ));
    };

    let header = AccountingEntry {
        id: EntryId::new(),
        period,
        date: voided_at.date_naive(),
        concept: format!(
            "Void of sale {sale_id}: {}",
            sale.void_reason().unwrap_or_default()
        ),
        origin_module: ORIGIN_SALE_VOID.to_string(),
        origin_id: *sale_id.0.as_uuid(),
    };
    Ok(original.reversed(header))
}
