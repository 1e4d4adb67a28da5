//! Debt simplification: turn a group's balance snapshot into a short list of
//! point-to-point transfers that settles everyone.
//!
//! Pure and deterministic. Transfers are never persisted; recompute them from
//! the current balances whenever they are needed.

pub mod error;
pub mod simplifier;
pub mod transfer;

pub use error::SimplifyError;
pub use simplifier::DebtSimplifier;
pub use transfer::{SimplifiedTransfer, apply_transfers};
