//! Split calculation (expense amount → per-member owed amounts).
//!
//! Pure domain logic only: deterministic, no time, no IO. Every successful
//! computation owes exactly the expense amount in total.

pub mod calculator;
pub mod error;
mod rounding;
pub mod split;
pub mod strategy;

pub use calculator::{OwedShare, Participant, SplitCalculator};
pub use error::SplitError;
pub use split::{Contribution, Split};
pub use strategy::SplitStrategy;
