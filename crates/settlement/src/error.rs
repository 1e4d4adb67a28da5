use thiserror::Error;

use tallyup_core::{DomainError, MemberId, Money};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimplifyError {
    /// Balances of a consistent ledger sum to zero.
    #[error("balances sum to {total}, expected zero")]
    InvariantViolation { total: Money },

    #[error("member {member} is left with {residue} after applying transfers")]
    Unsettled { member: MemberId, residue: Money },

    #[error("transfer {index} is invalid: {reason}")]
    InvalidTransfer { index: usize, reason: String },
}

impl From<SimplifyError> for DomainError {
    fn from(value: SimplifyError) -> Self {
        DomainError::invariant(value.to_string())
    }
}
