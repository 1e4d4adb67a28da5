use thiserror::Error;

use tallyup_core::{DomainError, Money};

/// Why a split could not be computed. Raised before any ledger mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SplitError {
    /// Caller-supplied parameters are inconsistent with the expense.
    #[error("invalid split parameters: {0}")]
    InvalidParameters(String),

    #[error("amount must be positive, got {0}")]
    NegativeOrZeroAmount(Money),

    /// The rounding remainder is larger than rounding alone can produce.
    #[error("rounding remainder of {remainder} exceeds one unit per participant ({participants})")]
    RoundingOverflow { remainder: i64, participants: usize },
}

impl SplitError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

impl From<SplitError> for DomainError {
    fn from(value: SplitError) -> Self {
        match value {
            SplitError::InvalidParameters(msg) => DomainError::Validation(msg),
            SplitError::NegativeOrZeroAmount(amount) => {
                DomainError::validation(format!("amount must be positive, got {amount}"))
            }
            err @ SplitError::RoundingOverflow { .. } => DomainError::invariant(err.to_string()),
        }
    }
}
