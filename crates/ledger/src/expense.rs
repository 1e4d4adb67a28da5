use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tallyup_core::{Currency, ExpenseId, MemberId, Money};
use tallyup_splits::{Contribution, Split, SplitStrategy};

use crate::error::LedgerError;

/// An expense as supplied by the caller.
///
/// Immutable once recorded; edits go through `GroupCommand::EditExpense`, which
/// reverses the old splits before applying the new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    #[serde(default)]
    pub description: String,
    pub amount: Money,
    pub currency: Currency,
    /// Stable order: the first participant absorbs rounding remainders.
    pub participants: Vec<MemberId>,
    pub payers: Vec<Contribution>,
    pub strategy: SplitStrategy,
    #[serde(default)]
    pub date: NaiveDate,
}

impl Expense {
    /// Single-payer expense (the common case).
    pub fn new(
        id: ExpenseId,
        amount: Money,
        currency: Currency,
        payer: MemberId,
        participants: Vec<MemberId>,
        strategy: SplitStrategy,
    ) -> Self {
        Self {
            id,
            description: String::new(),
            amount,
            currency,
            participants,
            payers: vec![Contribution::new(payer, amount)],
            strategy,
            date: NaiveDate::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Replace the payer list (several members chipping in).
    pub fn with_payers(mut self, payers: Vec<Contribution>) -> Self {
        self.payers = payers;
        self
    }

    /// Members whose balance this expense touches, in id order.
    pub fn touched_members(&self) -> BTreeSet<MemberId> {
        self.participants
            .iter()
            .copied()
            .chain(self.payers.iter().map(|p| p.member_id))
            .collect()
    }

    /// Shape checks that need no ledger state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::NegativeOrZeroAmount(self.amount));
        }
        if self.payers.is_empty() {
            return Err(LedgerError::invalid(format!("expense {} has no payer", self.id)));
        }

        let mut paid = Money::ZERO;
        for payer in &self.payers {
            if !payer.amount.is_positive() {
                return Err(LedgerError::NegativeOrZeroAmount(payer.amount));
            }
            paid = paid
                .checked_add(payer.amount)
                .ok_or_else(|| LedgerError::invalid("payer contributions overflow"))?;
        }
        if paid != self.amount {
            return Err(LedgerError::invalid(format!(
                "payers contributed {paid}, expense amount is {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// An expense together with the splits that were applied for it.
///
/// The stored splits are what gets reversed on edit/delete, so a later change of
/// member weights never skews the reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedExpense {
    pub expense: Expense,
    pub splits: Vec<Split>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u128) -> MemberId {
        MemberId::from_u128(n)
    }

    #[test]
    fn payers_must_cover_the_amount() {
        let expense = Expense::new(
            ExpenseId::from_u128(1),
            Money::from_minor(1_000),
            Currency::usd(),
            member(1),
            vec![member(1), member(2)],
            SplitStrategy::Equal,
        )
        .with_payers(vec![
            Contribution::new(member(1), Money::from_minor(600)),
            Contribution::new(member(2), Money::from_minor(300)),
        ]);

        assert!(matches!(
            expense.validate(),
            Err(LedgerError::InvalidParameters(_))
        ));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let expense = Expense::new(
            ExpenseId::from_u128(1),
            Money::from_minor(-5),
            Currency::usd(),
            member(1),
            vec![member(1)],
            SplitStrategy::Equal,
        );
        assert_eq!(
            expense.validate(),
            Err(LedgerError::NegativeOrZeroAmount(Money::from_minor(-5)))
        );
    }

    #[test]
    fn touched_members_include_non_participating_payers() {
        let expense = Expense::new(
            ExpenseId::from_u128(1),
            Money::from_minor(1_000),
            Currency::usd(),
            member(9),
            vec![member(2), member(1)],
            SplitStrategy::Equal,
        );
        let touched: Vec<_> = expense.touched_members().into_iter().collect();
        assert_eq!(touched, vec![member(1), member(2), member(9)]);
    }
}
