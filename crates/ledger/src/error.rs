use thiserror::Error;

use tallyup_core::{DomainError, ExpenseId, GroupId, MemberId, Money, SettlementId};
use tallyup_splits::SplitError;

/// Ledger failures. Every variant is raised before anything is mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("amount must be positive, got {0}")]
    NegativeOrZeroAmount(Money),

    #[error("unknown member {0}")]
    UnknownMember(MemberId),

    #[error("member {0} is inactive")]
    InactiveMember(MemberId),

    #[error("member {0} already belongs to the group")]
    DuplicateMember(MemberId),

    #[error("member {member} still has a balance of {balance}")]
    OutstandingBalance { member: MemberId, balance: Money },

    #[error("member {0} is still referenced by recorded entries")]
    MemberReferenced(MemberId),

    #[error("currency mismatch: group uses {expected}, entry uses {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("unknown expense {0}")]
    UnknownExpense(ExpenseId),

    #[error("expense {0} already recorded")]
    DuplicateExpense(ExpenseId),

    #[error("unknown settlement {0}")]
    UnknownSettlement(SettlementId),

    #[error("settlement {0} already recorded")]
    DuplicateSettlement(SettlementId),

    #[error("balance of member {0} would overflow")]
    BalanceOverflow(MemberId),

    #[error("command for group {found} sent to group {expected}")]
    GroupMismatch { expected: GroupId, found: GroupId },
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

impl From<LedgerError> for DomainError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Split(err) => err.into(),
            err @ (LedgerError::UnknownMember(_)
            | LedgerError::UnknownExpense(_)
            | LedgerError::UnknownSettlement(_)) => DomainError::not_found(err.to_string()),
            err @ (LedgerError::DuplicateMember(_)
            | LedgerError::DuplicateExpense(_)
            | LedgerError::DuplicateSettlement(_)) => DomainError::conflict(err.to_string()),
            err @ (LedgerError::BalanceOverflow(_)
            | LedgerError::OutstandingBalance { .. }
            | LedgerError::MemberReferenced(_)
            | LedgerError::GroupMismatch { .. }) => DomainError::invariant(err.to_string()),
            err => DomainError::validation(err.to_string()),
        }
    }
}
