//! Recurring expenses: a template plus a schedule of occurrence dates.
//!
//! Monthly schedules anchored on a day the target month lacks land on that
//! month's last day (Jan 31 -> Feb 28/29 -> Mar 31). Every occurrence is
//! computed from the start date, so a short month never shifts later ones.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use tallyup_core::ExpenseId;

use crate::error::LedgerError;
use crate::expense::Expense;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    start: NaiveDate,
    cadence: Cadence,
    every: u32,
}

impl RecurringSchedule {
    /// Repeat every `every` weeks/months starting at `start`.
    pub fn new(start: NaiveDate, cadence: Cadence, every: u32) -> Result<Self, LedgerError> {
        if every == 0 {
            return Err(LedgerError::invalid("recurrence interval must be at least 1"));
        }
        Ok(Self {
            start,
            cadence,
            every,
        })
    }

    pub fn monthly(start: NaiveDate) -> Self {
        Self {
            start,
            cadence: Cadence::Monthly,
            every: 1,
        }
    }

    pub fn weekly(start: NaiveDate) -> Self {
        Self {
            start,
            cadence: Cadence::Weekly,
            every: 1,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// The `n`-th occurrence (0 is `start`); `None` past the calendar's range.
    pub fn occurrence(&self, n: u32) -> Option<NaiveDate> {
        let steps = n.checked_mul(self.every)?;
        match self.cadence {
            Cadence::Monthly => self.start.checked_add_months(Months::new(steps)),
            Cadence::Weekly => self
                .start
                .checked_add_days(Days::new(u64::from(steps) * 7)),
        }
    }

    /// Occurrences in `(after, through]`; everything up to `through` when
    /// `after` is `None`.
    pub fn due_between(&self, after: Option<NaiveDate>, through: NaiveDate) -> Vec<NaiveDate> {
        (0..)
            .map_while(|n| self.occurrence(n))
            .take_while(|date| *date <= through)
            .filter(|date| after.is_none_or(|after| *date > after))
            .collect()
    }
}

/// An expense that repeats on a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringExpense {
    pub template: Expense,
    pub schedule: RecurringSchedule,
}

impl RecurringExpense {
    pub fn new(template: Expense, schedule: RecurringSchedule) -> Self {
        Self { template, schedule }
    }

    /// Concrete expenses for every occurrence in `(after, through]`.
    ///
    /// `next_id` mints the id of each generated expense from its date.
    pub fn materialize(
        &self,
        after: Option<NaiveDate>,
        through: NaiveDate,
        mut next_id: impl FnMut(NaiveDate) -> ExpenseId,
    ) -> Vec<Expense> {
        let expenses: Vec<Expense> = self
            .schedule
            .due_between(after, through)
            .into_iter()
            .map(|date| {
                let mut expense = self.template.clone().on(date);
                expense.id = next_id(date);
                expense
            })
            .collect();
        tracing::debug!(
            template = %self.template.id,
            generated = expenses.len(),
            "recurring expenses materialized"
        );
        expenses
    }
}
