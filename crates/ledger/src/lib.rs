//! Group ledger (per-member running balances, event-sourced).
//!
//! Pure domain logic only: no IO, no persistence concerns. `BalanceLedger` is the
//! single authoritative balance map of a group; `GroupLedger` is the aggregate
//! that records expenses and settlements against it.

pub mod balance;
pub mod error;
pub mod expense;
pub mod group;
pub mod member;
pub mod projection;
pub mod recurring;
pub mod settlement;

pub use balance::{BalanceDelta, BalanceLedger};
pub use error::LedgerError;
pub use expense::{Expense, RecordedExpense};
pub use group::{GroupCommand, GroupEvent, GroupLedger};
pub use member::Member;
pub use projection::{BalanceProjection, MemberBalanceView};
pub use recurring::{Cadence, RecurringExpense, RecurringSchedule};
pub use settlement::Settlement;
