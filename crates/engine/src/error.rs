use thiserror::Error;

use tallyup_core::{DomainError, GroupId};
use tallyup_events::ProjectionError;
use tallyup_ledger::LedgerError;
use tallyup_settlement::SimplifyError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("group {0} already exists")]
    DuplicateGroup(GroupId),

    /// The caller's expected version no longer matches the group.
    #[error("{0}")]
    Concurrency(String),

    /// A writer panicked while holding the lock; the group is unusable.
    #[error("lock for {0} is poisoned")]
    LockPoisoned(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Simplify(#[from] SimplifyError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed input handed to the engine (e.g. a scenario file).
    #[error("invalid input: {0}")]
    Input(String),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => EngineError::Concurrency(msg),
            other => EngineError::Input(other.to_string()),
        }
    }
}
