//! Balance read model over a group's event stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tallyup_core::{MemberId, Money};
use tallyup_events::{EventEnvelope, Projection};

use crate::group::GroupEvent;

/// One row of the balance view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalanceView {
    pub member_id: MemberId,
    pub name: String,
    pub balance: Money,
    pub active: bool,
}

/// Per-member balances rebuilt from `GroupEvent`s alone.
///
/// Envelopes at or below the last seen sequence number are skipped, so
/// redelivery is harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceProjection {
    rows: BTreeMap<MemberId, MemberBalanceView>,
    last_sequence_number: Option<u64>,
}

impl BalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, member_id: &MemberId) -> Option<&MemberBalanceView> {
        self.rows.get(member_id)
    }

    /// Rows in member-id order.
    pub fn rows(&self) -> impl Iterator<Item = &MemberBalanceView> {
        self.rows.values()
    }

    pub fn balances(&self) -> BTreeMap<MemberId, Money> {
        self.rows.iter().map(|(id, row)| (*id, row.balance)).collect()
    }

    pub fn last_sequence_number(&self) -> Option<u64> {
        self.last_sequence_number
    }
}

impl Projection for BalanceProjection {
    type Ev = GroupEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let seq = envelope.sequence_number();
        if self.last_sequence_number.is_some_and(|last| seq <= last) {
            return;
        }
        self.last_sequence_number = Some(seq);

        let event = envelope.payload();
        match event {
            GroupEvent::MemberAdded(e) => {
                self.rows.insert(
                    e.member_id,
                    MemberBalanceView {
                        member_id: e.member_id,
                        name: e.name.clone(),
                        balance: Money::ZERO,
                        active: true,
                    },
                );
            }
            GroupEvent::MemberDeactivated(e) => {
                if let Some(row) = self.rows.get_mut(&e.member_id) {
                    row.active = false;
                }
            }
            GroupEvent::MemberReactivated(e) => {
                if let Some(row) = self.rows.get_mut(&e.member_id) {
                    row.active = true;
                }
            }
            GroupEvent::MemberRemoved(e) => {
                self.rows.remove(&e.member_id);
            }
            GroupEvent::MemberWeightChanged(_) => {}
            _ => {
                for (member_id, change) in event.balance_delta().iter() {
                    if let Some(row) = self.rows.get_mut(member_id) {
                        row.balance += *change;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use tallyup_core::{Currency, ExpenseId, GroupId};
    use tallyup_events::{ProjectionRunner, execute};
    use tallyup_splits::SplitStrategy;
    use uuid::Uuid;

    use crate::expense::Expense;
    use crate::group::{AddMember, ExpenseCommand, GroupCommand, GroupLedger};

    fn envelopes(group_id: GroupId, events: Vec<GroupEvent>) -> Vec<EventEnvelope<GroupEvent>> {
        events
            .into_iter()
            .enumerate()
            .map(|(i, ev)| EventEnvelope::new(Uuid::now_v7(), group_id, i as u64 + 1, ev))
            .collect()
    }

    fn history() -> (GroupLedger, Vec<EventEnvelope<GroupEvent>>) {
        let group_id = GroupId::from_u128(1);
        let mut ledger = GroupLedger::new(group_id, Currency::usd());
        let mut events = Vec::new();
        for n in 1..=3u128 {
            events.extend(
                execute(
                    &mut ledger,
                    &GroupCommand::AddMember(AddMember {
                        group_id,
                        member_id: MemberId::from_u128(n),
                        name: format!("member-{n}"),
                        external_ref: None,
                        weight: Decimal::ONE,
                        occurred_at: DateTime::<Utc>::UNIX_EPOCH,
                    }),
                )
                .unwrap(),
            );
        }
        let expense = Expense::new(
            ExpenseId::from_u128(1),
            Money::from_minor(1_000),
            Currency::usd(),
            MemberId::from_u128(1),
            (1..=3).map(MemberId::from_u128).collect(),
            SplitStrategy::Equal,
        );
        events.extend(
            execute(
                &mut ledger,
                &GroupCommand::RecordExpense(ExpenseCommand {
                    group_id,
                    expense,
                    occurred_at: DateTime::<Utc>::UNIX_EPOCH,
                }),
            )
            .unwrap(),
        );
        (ledger, envelopes(group_id, events))
    }

    #[test]
    fn projection_matches_the_aggregate() {
        let (ledger, envelopes) = history();
        let (projection, cursor) =
            ProjectionRunner::rebuild_from_scratch(BalanceProjection::new, &envelopes).unwrap();

        assert_eq!(projection.balances(), ledger.balances());
        assert_eq!(cursor.unwrap().last_sequence_number(), 4);
        assert_eq!(
            projection.get(&MemberId::from_u128(2)).unwrap().balance,
            Money::from_minor(-333)
        );
    }

    #[test]
    fn redelivered_envelopes_are_skipped() {
        let (ledger, envelopes) = history();
        let mut projection = BalanceProjection::new();
        for env in envelopes.iter().chain(envelopes.iter()) {
            projection.apply(env);
        }
        assert_eq!(projection.balances(), ledger.balances());
        assert_eq!(projection.last_sequence_number(), Some(4));
    }
}
