use std::cmp::Reverse;
use std::collections::BTreeMap;

use tallyup_core::{MemberId, Money};

use crate::error::SimplifyError;
use crate::transfer::{SimplifiedTransfer, apply_transfers};

/// Greedy largest-creditor / largest-debtor matcher.
///
/// Each transfer settles at least one party in full, so `N` members with a
/// non-zero balance need at most `N - 1` transfers. Ties are broken by member id
/// and the result is ordered by `(from, to)`, so the output is a pure function of
/// the balance map.
///
/// The default tolerance is zero, so every non-zero balance takes part and the
/// result settles balances exactly. `with_tolerance(Money::MINOR_UNIT)` leaves
/// balances of a single cent out of the partition, the usual 0.01 threshold for
/// two-decimal currencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebtSimplifier {
    tolerance: Money,
}

/// A member still owed money (creditor) or still owing it (debtor).
#[derive(Debug, Clone, Copy)]
struct Party {
    member: MemberId,
    remaining: Money,
}

impl DebtSimplifier {
    /// Balances within `tolerance` of zero count as settled.
    pub fn with_tolerance(tolerance: Money) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Money {
        self.tolerance
    }

    pub fn simplify(
        &self,
        balances: &BTreeMap<MemberId, Money>,
    ) -> Result<Vec<SimplifiedTransfer>, SimplifyError> {
        self.ensure_balanced(balances)?;

        let mut creditors = self.parties(balances, Money::is_positive);
        let mut debtors = self.parties(balances, Money::is_negative);

        let mut transfers = Vec::with_capacity(creditors.len() + debtors.len());
        let (mut c, mut d) = (0, 0);
        while c < creditors.len() && d < debtors.len() {
            let creditor = &mut creditors[c];
            let debtor = &mut debtors[d];

            let amount = creditor.remaining.min(debtor.remaining);
            transfers.push(SimplifiedTransfer {
                from: debtor.member,
                to: creditor.member,
                amount,
            });
            creditor.remaining -= amount;
            debtor.remaining -= amount;

            if creditor.remaining.within(self.tolerance) {
                c += 1;
            }
            if debtor.remaining.within(self.tolerance) {
                d += 1;
            }
        }

        transfers.sort_unstable_by_key(|t| (t.from, t.to));

        tracing::debug!(
            members = balances.len(),
            transfers = transfers.len(),
            "balances simplified"
        );
        Ok(transfers)
    }

    /// Check that `transfers` settle `balances` to within tolerance.
    pub fn verify(
        &self,
        balances: &BTreeMap<MemberId, Money>,
        transfers: &[SimplifiedTransfer],
    ) -> Result<(), SimplifyError> {
        for (index, transfer) in transfers.iter().enumerate() {
            if !transfer.amount.is_positive() {
                return Err(SimplifyError::InvalidTransfer {
                    index,
                    reason: format!("amount {} is not positive", transfer.amount),
                });
            }
            if transfer.from == transfer.to {
                return Err(SimplifyError::InvalidTransfer {
                    index,
                    reason: format!("{} pays themselves", transfer.from),
                });
            }
        }

        let after = apply_transfers(balances, transfers);
        match after.iter().find(|(_, b)| !b.within(self.tolerance)) {
            Some((member, residue)) => Err(SimplifyError::Unsettled {
                member: *member,
                residue: *residue,
            }),
            None => Ok(()),
        }
    }

    fn ensure_balanced(&self, balances: &BTreeMap<MemberId, Money>) -> Result<(), SimplifyError> {
        let total: i128 = balances.values().map(|b| i128::from(b.minor())).sum();
        if total.unsigned_abs() > u128::from(self.tolerance.minor().unsigned_abs()) {
            let total = i64::try_from(total).map_or(Money::from_minor(i64::MAX), Money::from_minor);
            return Err(SimplifyError::InvariantViolation { total });
        }
        Ok(())
    }

    /// Parties on one side, largest first, ties by member id.
    fn parties(
        &self,
        balances: &BTreeMap<MemberId, Money>,
        side: impl Fn(Money) -> bool,
    ) -> Vec<Party> {
        let mut parties: Vec<Party> = balances
            .iter()
            .filter(|(_, b)| side(**b) && !b.within(self.tolerance))
            .map(|(member, b)| Party {
                member: *member,
                remaining: b.abs(),
            })
            .collect();
        parties.sort_by_key(|p| (Reverse(p.remaining), p.member));
        parties
    }
}
