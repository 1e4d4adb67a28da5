use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{MemberId, Money};

/// How an expense is divided among its participants.
///
/// Each variant carries exactly the parameters it needs. Equity splits take their
/// weights from the participants themselves (see [`crate::Participant`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Same amount for everyone.
    Equal,
    /// Proportional to each participant's weight.
    Equity,
    /// Caller-supplied absolute amounts.
    Exact { amounts: BTreeMap<MemberId, Money> },
    /// Caller-supplied percentages summing to 100.
    Percentage { percentages: BTreeMap<MemberId, Decimal> },
    /// Caller-supplied positive share counts.
    Shares { shares: BTreeMap<MemberId, Decimal> },
}

impl SplitStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            SplitStrategy::Equal => "equal",
            SplitStrategy::Equity => "equity",
            SplitStrategy::Exact { .. } => "exact",
            SplitStrategy::Percentage { .. } => "percentage",
            SplitStrategy::Shares { .. } => "shares",
        }
    }

    /// Percentage this strategy assigned to `member`, if it is percentage-based.
    pub fn percentage_of(&self, member: &MemberId) -> Option<Decimal> {
        match self {
            SplitStrategy::Percentage { percentages } => percentages.get(member).copied(),
            _ => None,
        }
    }

    /// Share count this strategy assigned to `member`, if it is share-based.
    pub fn shares_of(&self, member: &MemberId) -> Option<Decimal> {
        match self {
            SplitStrategy::Shares { shares } => shares.get(member).copied(),
            _ => None,
        }
    }
}
