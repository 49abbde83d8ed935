use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_core::Money;

use crate::error::AccountingError;

/// Journal entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Journal entry header.
///
/// `(origin_module, origin_id)` names the business fact the entry books and is
/// unique across the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingEntry {
    pub id: EntryId,
    pub period: String,
    pub date: NaiveDate,
    pub concept: String,
    pub origin_module: String,
    pub origin_id: Uuid,
}

/// One line of a journal entry. Exactly one of `debit` / `credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingLine {
    pub entry_id: EntryId,
    pub account_ref: String,
    pub debit: Money,
    pub credit: Money,
}

impl AccountingLine {
    pub fn debit(entry_id: EntryId, account_ref: impl Into<String>, amount: Money) -> Self {
        Self {
            entry_id,
            account_ref: account_ref.into(),
            debit: amount,
            credit: Money::zero(),
        }
    }

    pub fn credit(entry_id: EntryId, account_ref: impl Into<String>, amount: Money) -> Self {
        Self {
            entry_id,
            account_ref: account_ref.into(),
            debit: Money::zero(),
            credit: amount,
        }
    }
}

/// A balanced journal entry: header plus lines.
///
/// Only constructible through [`JournalEntry::new`], which enforces
/// `Σ debit == Σ credit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    header: AccountingEntry,
    lines: Vec<AccountingLine>,
}

impl JournalEntry {
    pub fn new(
        header: AccountingEntry,
        lines: Vec<AccountingLine>,
    ) -> Result<Self, AccountingError> {
        if lines.is_empty() {
            return Err(AccountingError::EmptyEntry);
        }

        for line in &lines {
            if line.entry_id != header.id {
                return Err(AccountingError::InvalidLine(format!(
                    "line for account {} belongs to entry {}, not {}",
                    line.account_ref, line.entry_id, header.id
                )));
            }
            if line.debit.is_negative() || line.credit.is_negative() {
                return Err(AccountingError::InvalidLine(format!(
                    "negative amount on account {}",
                    line.account_ref
                )));
            }
            if line.debit.is_positive() == line.credit.is_positive() {
                return Err(AccountingError::InvalidLine(format!(
                    "account {} must carry exactly one of debit or credit",
                    line.account_ref
                )));
            }
        }

        let debits: Money = lines.iter().map(|l| l.debit).sum();
        let credits: Money = lines.iter().map(|l| l.credit).sum();
        if debits != credits {
            return Err(AccountingError::Unbalanced { debits, credits });
        }

        Ok(Self { header, lines })
    }

    pub fn header(&self) -> &AccountingEntry {
        &self.header
    }

    pub fn lines(&self) -> &[AccountingLine] {
        &self.lines
    }

    pub fn total_debit(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Sum of one account's lines as `(debit, credit)`.
    pub fn account_totals(&self, account_ref: &str) -> (Money, Money) {
        self.lines
            .iter()
            .filter(|l| l.account_ref == account_ref)
            .fold((Money::zero(), Money::zero()), |(d, c), l| {
                (d + l.debit, c + l.credit)
            })
    }

    /// Mirror entry under a new header: every debit becomes a credit and vice versa.
    pub fn reversed(&self, header: AccountingEntry) -> Self {
        let lines = self
            .lines
            .iter()
            .map(|l| AccountingLine {
                entry_id: header.id,
                account_ref: l.account_ref.clone(),
                debit: l.credit,
                credit: l.debit,
            })
            .collect();
        Self { header, lines }
    }

    pub fn into_parts(self) -> (AccountingEntry, Vec<AccountingLine>) {
        (self.header, self.lines)
    }
}
