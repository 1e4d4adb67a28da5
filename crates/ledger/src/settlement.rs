use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tallyup_core::{Currency, MemberId, Money, SettlementId};

use crate::error::LedgerError;

/// A direct payment from one member to another, outside any expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
    pub currency: Currency,
    #[serde(default)]
    pub date: NaiveDate,
}

impl Settlement {
    pub fn new(
        id: SettlementId,
        from: MemberId,
        to: MemberId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            id,
            from,
            to,
            amount,
            currency,
            date: NaiveDate::default(),
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Shape checks that need no ledger state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::NegativeOrZeroAmount(self.amount));
        }
        if self.from == self.to {
            return Err(LedgerError::invalid(format!(
                "member {} cannot settle with themselves",
                self.from
            )));
        }
        Ok(())
    }
}
