//! SplitCalculator: `(amount, participants, strategy) -> [(member, owed)]`.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{MemberId, Money};

use crate::error::SplitError;
use crate::rounding::{allocate_proportionally, reconcile};
use crate::strategy::SplitStrategy;

/// One person taking part in an expense.
///
/// `weight` only matters for equity splits; it defaults to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub member_id: MemberId,
    #[serde(default = "default_weight")]
    pub weight: Decimal,
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

impl Participant {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            weight: Decimal::ONE,
        }
    }

    pub fn weighted(member_id: MemberId, weight: Decimal) -> Self {
        Self { member_id, weight }
    }
}

/// Calculator output: what one participant owes for one expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwedShare {
    pub member_id: MemberId,
    pub owed: Money,
}

/// Pure split calculator.
///
/// `tolerance` is how far caller-supplied exact amounts may drift from the
/// expense total (one minor unit by default); `percentage_tolerance` is the same
/// for percentage sums (0.01 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCalculator {
    tolerance: Money,
    percentage_tolerance: Decimal,
}

impl Default for SplitCalculator {
    fn default() -> Self {
        Self {
            tolerance: Money::MINOR_UNIT,
            percentage_tolerance: Decimal::new(1, 2),
        }
    }
}

impl SplitCalculator {
    pub fn new(tolerance: Money, percentage_tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
            percentage_tolerance: percentage_tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Money {
        self.tolerance
    }

    /// Compute each participant's owed amount.
    ///
    /// Output order follows `participants`; the sum of `owed` equals `amount`.
    pub fn compute(
        &self,
        amount: Money,
        participants: &[Participant],
        strategy: &SplitStrategy,
    ) -> Result<Vec<OwedShare>, SplitError> {
        if !amount.is_positive() {
            return Err(SplitError::NegativeOrZeroAmount(amount));
        }
        let ids = participant_ids(participants)?;

        let raw = match strategy {
            SplitStrategy::Equal => {
                allocate_proportionally(amount, &vec![Decimal::ONE; participants.len()])?
            }
            SplitStrategy::Equity => {
                let weights = equity_weights(participants)?;
                allocate_proportionally(amount, &weights)?
            }
            SplitStrategy::Exact { amounts } => self.exact_amounts(amount, &ids, amounts)?,
            SplitStrategy::Percentage { percentages } => {
                let ratios = self.percentages(&ids, percentages)?;
                allocate_proportionally(amount, &ratios)?
            }
            SplitStrategy::Shares { shares } => {
                let ratios = share_counts(&ids, shares)?;
                allocate_proportionally(amount, &ratios)?
            }
        };

        let owed = reconcile(amount, raw)?;
        let shares: Vec<OwedShare> = ids
            .iter()
            .zip(owed)
            .map(|(member_id, owed)| OwedShare {
                member_id: *member_id,
                owed: Money::from_minor(owed),
            })
            .collect();

        tracing::debug!(
            strategy = strategy.kind(),
            amount = amount.minor(),
            participants = shares.len(),
            "computed splits"
        );
        Ok(shares)
    }

    fn exact_amounts(
        &self,
        amount: Money,
        ids: &[MemberId],
        amounts: &BTreeMap<MemberId, Money>,
    ) -> Result<Vec<i64>, SplitError> {
        ensure_keys_match(ids, amounts.keys(), "exact amount")?;

        let mut total = Money::ZERO;
        let mut raw = Vec::with_capacity(ids.len());
        for id in ids {
            let value = amounts[id];
            if value.is_negative() {
                return Err(SplitError::invalid(format!(
                    "exact amount for {id} is negative ({value})"
                )));
            }
            total = total
                .checked_add(value)
                .ok_or_else(|| SplitError::invalid("exact amounts overflow"))?;
            raw.push(value.minor());
        }

        let drift = amount
            .checked_sub(total)
            .ok_or_else(|| SplitError::invalid("exact amounts overflow"))?;
        if !drift.within(self.tolerance) {
            return Err(SplitError::invalid(format!(
                "exact amounts sum to {total}, expected {amount}"
            )));
        }
        Ok(raw)
    }

    fn percentages(
        &self,
        ids: &[MemberId],
        percentages: &BTreeMap<MemberId, Decimal>,
    ) -> Result<Vec<Decimal>, SplitError> {
        ensure_keys_match(ids, percentages.keys(), "percentage")?;

        let mut ratios = Vec::with_capacity(ids.len());
        for id in ids {
            let pct = percentages[id];
            if pct < Decimal::ZERO {
                return Err(SplitError::invalid(format!(
                    "percentage for {id} is negative ({pct})"
                )));
            }
            ratios.push(pct);
        }

        let total: Decimal = ratios.iter().sum();
        if (total - Decimal::ONE_HUNDRED).abs() > self.percentage_tolerance {
            return Err(SplitError::invalid(format!(
                "percentages sum to {total}, expected 100"
            )));
        }
        Ok(ratios)
    }
}

fn participant_ids(participants: &[Participant]) -> Result<Vec<MemberId>, SplitError> {
    if participants.is_empty() {
        return Err(SplitError::invalid("expense has no participants"));
    }

    let mut seen = BTreeSet::new();
    let mut ids = Vec::with_capacity(participants.len());
    for p in participants {
        if !seen.insert(p.member_id) {
            return Err(SplitError::invalid(format!(
                "participant {} listed more than once",
                p.member_id
            )));
        }
        ids.push(p.member_id);
    }
    Ok(ids)
}

fn equity_weights(participants: &[Participant]) -> Result<Vec<Decimal>, SplitError> {
    participants
        .iter()
        .map(|p| {
            if p.weight <= Decimal::ZERO {
                Err(SplitError::invalid(format!(
                    "weight of {} must be positive, got {}",
                    p.member_id, p.weight
                )))
            } else {
                Ok(p.weight)
            }
        })
        .collect()
}

fn share_counts(
    ids: &[MemberId],
    shares: &BTreeMap<MemberId, Decimal>,
) -> Result<Vec<Decimal>, SplitError> {
    if shares.is_empty() {
        return Err(SplitError::invalid("no share counts supplied"));
    }
    ensure_keys_match(ids, shares.keys(), "share count")?;

    ids.iter()
        .map(|id| {
            let count = shares[id];
            if count <= Decimal::ZERO {
                Err(SplitError::invalid(format!(
                    "share count for {id} must be positive, got {count}"
                )))
            } else {
                Ok(count)
            }
        })
        .collect()
}

/// Per-participant parameters must cover every participant and nobody else.
fn ensure_keys_match<'a>(
    ids: &[MemberId],
    keys: impl Iterator<Item = &'a MemberId>,
    what: &str,
) -> Result<(), SplitError> {
    let expected: BTreeSet<&MemberId> = ids.iter().collect();
    let supplied: BTreeSet<&MemberId> = keys.collect();

    if let Some(missing) = expected.difference(&supplied).next() {
        return Err(SplitError::invalid(format!("no {what} supplied for {missing}")));
    }
    if let Some(extra) = supplied.difference(&expected).next() {
        return Err(SplitError::invalid(format!(
            "{what} supplied for non-participant {extra}"
        )));
    }
    Ok(())
}
