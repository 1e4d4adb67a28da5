use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{MemberId, Money, ValueObject};

use crate::calculator::OwedShare;
use crate::strategy::SplitStrategy;

/// Money a member put towards an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub member_id: MemberId,
    pub amount: Money,
}

impl Contribution {
    pub fn new(member_id: MemberId, amount: Money) -> Self {
        Self { member_id, amount }
    }
}

/// One member's line of an expense: what they owe and what they paid.
///
/// Derived from the expense, never authoritative on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub member_id: MemberId,
    pub owed: Money,
    pub paid: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,
}

impl ValueObject for Split {}

impl Split {
    /// Signed balance effect of this line: positive when the member paid more
    /// than their share.
    pub fn net(&self) -> Money {
        self.paid - self.owed
    }

    /// Merge calculator output with who paid.
    ///
    /// Participants come first in calculator order; payers who did not take part
    /// follow in contribution order with `owed = 0`.
    pub fn assemble(
        owed: &[OwedShare],
        strategy: &SplitStrategy,
        contributions: &[Contribution],
    ) -> Vec<Split> {
        let paid_by = |member: &MemberId| -> Money {
            contributions
                .iter()
                .filter(|c| c.member_id == *member)
                .map(|c| c.amount)
                .sum()
        };

        let mut splits: Vec<Split> = owed
            .iter()
            .map(|share| Split {
                member_id: share.member_id,
                owed: share.owed,
                paid: paid_by(&share.member_id),
                percentage: strategy.percentage_of(&share.member_id),
                shares: strategy.shares_of(&share.member_id),
            })
            .collect();

        for contribution in contributions {
            if splits.iter().any(|s| s.member_id == contribution.member_id) {
                continue;
            }
            splits.push(Split {
                member_id: contribution.member_id,
                owed: Money::ZERO,
                paid: paid_by(&contribution.member_id),
                percentage: None,
                shares: None,
            });
        }

        splits
    }
}
