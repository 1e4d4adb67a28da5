use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use tallyup_core::{AggregateRoot, Currency, ExpectedVersion, GroupId, MemberId, Money};
use tallyup_events::{EventEnvelope, ProjectionRunner, execute};
use tallyup_ledger::{BalanceProjection, Expense, GroupCommand, GroupEvent, GroupLedger};
use tallyup_settlement::{DebtSimplifier, SimplifiedTransfer};
use tallyup_splits::{Split, SplitCalculator};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// One group's aggregate and its committed event stream, guarded together.
#[derive(Debug)]
struct GroupState {
    ledger: GroupLedger,
    log: Vec<EventEnvelope<GroupEvent>>,
    /// Sequence number the next committed event gets.
    next_sequence: u64,
}

type GroupSlot = Arc<RwLock<GroupState>>;

/// In-process owner of group ledgers.
///
/// Each group sits behind its own `RwLock`, so writers to different groups never
/// contend and readers of one group always see a state between two commands.
#[derive(Debug)]
pub struct GroupService {
    calculator: SplitCalculator,
    simplifier: DebtSimplifier,
    default_currency: Currency,
    groups: RwLock<HashMap<GroupId, GroupSlot>>,
}

impl GroupService {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::with_parts(
            config.calculator(),
            config.simplifier(),
            config.currency()?,
        ))
    }

    pub fn with_parts(
        calculator: SplitCalculator,
        simplifier: DebtSimplifier,
        default_currency: Currency,
    ) -> Self {
        Self {
            calculator,
            simplifier,
            default_currency,
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_currency(&self) -> &Currency {
        &self.default_currency
    }

    /// Open an empty group in the default currency.
    pub fn create_group(&self, group_id: GroupId) -> Result<(), EngineError> {
        self.create_group_in(group_id, self.default_currency.clone())
    }

    pub fn create_group_in(
        &self,
        group_id: GroupId,
        currency: Currency,
    ) -> Result<(), EngineError> {
        let ledger = GroupLedger::new(group_id, currency).with_calculator(self.calculator);
        self.insert(group_id, GroupState {
            ledger,
            log: Vec::new(),
            next_sequence: 1,
        })?;
        tracing::info!(group = %group_id, "group created");
        Ok(())
    }

    /// Rebuild a group from a previously persisted event stream.
    ///
    /// The stream must belong to `group_id`, have strictly increasing sequence
    /// numbers (gaps are fine) and replay cleanly onto an empty group. Nothing
    /// is registered when any of that fails. New events continue after the
    /// last restored sequence number.
    pub fn restore_group(
        &self,
        group_id: GroupId,
        currency: Currency,
        envelopes: Vec<EventEnvelope<GroupEvent>>,
    ) -> Result<(), EngineError> {
        let mut ledger = GroupLedger::new(group_id, currency).with_calculator(self.calculator);
        ledger.replay_checked(envelopes.iter().map(EventEnvelope::payload))?;

        let mut runner = ProjectionRunner::new_for_group(group_id, BalanceProjection::new());
        runner.run(&envelopes)?;
        let last = runner
            .cursor()
            .map_or(0, |cursor| cursor.last_sequence_number());

        let events = envelopes.len();
        self.insert(group_id, GroupState {
            ledger,
            log: envelopes,
            next_sequence: last + 1,
        })?;
        tracing::info!(group = %group_id, events, last_sequence = last, "group restored");
        Ok(())
    }

    pub fn group_ids(&self) -> Result<Vec<GroupId>, EngineError> {
        let groups = self
            .groups
            .read()
            .map_err(|_| EngineError::LockPoisoned("group registry".to_string()))?;
        let mut ids: Vec<GroupId> = groups.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Decide and apply `command` atomically under the group's write lock.
    ///
    /// Returns the committed envelopes; an empty list when the command was a
    /// no-op (e.g. deactivating an already inactive member).
    pub fn execute(
        &self,
        group_id: GroupId,
        command: GroupCommand,
        expected: ExpectedVersion,
    ) -> Result<Vec<EventEnvelope<GroupEvent>>, EngineError> {
        let slot = self.slot(group_id)?;
        let mut state = write(&slot, group_id)?;

        expected.check(state.ledger.version())?;
        let events = execute(&mut state.ledger, &command)?;

        let first = state.next_sequence;
        let committed: Vec<EventEnvelope<GroupEvent>> = events
            .into_iter()
            .zip(first..)
            .map(|(event, seq)| EventEnvelope::new(Uuid::now_v7(), group_id, seq, event))
            .collect();
        state.next_sequence = first + committed.len() as u64;
        state.log.extend(committed.iter().cloned());

        tracing::info!(
            group = %group_id,
            events = committed.len(),
            version = state.ledger.version(),
            "command committed"
        );
        Ok(committed)
    }

    /// Clone of the group's aggregate as of the last committed command.
    pub fn snapshot(&self, group_id: GroupId) -> Result<GroupLedger, EngineError> {
        let slot = self.slot(group_id)?;
        let state = read(&slot, group_id)?;
        Ok(state.ledger.clone())
    }

    pub fn balances(&self, group_id: GroupId) -> Result<BTreeMap<MemberId, Money>, EngineError> {
        let slot = self.slot(group_id)?;
        let state = read(&slot, group_id)?;
        Ok(state.ledger.balances())
    }

    /// Who pays whom to settle the group, from a consistent balance snapshot.
    pub fn simplified_transfers(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SimplifiedTransfer>, EngineError> {
        let balances = self.balances(group_id)?;
        Ok(self.simplifier.simplify(&balances)?)
    }

    /// Splits `expense` would get right now, without recording it.
    pub fn preview_splits(
        &self,
        group_id: GroupId,
        expense: &Expense,
    ) -> Result<Vec<Split>, EngineError> {
        let slot = self.slot(group_id)?;
        let state = read(&slot, group_id)?;
        Ok(state.ledger.preview_splits(expense)?)
    }

    /// Committed event stream of the group, for persistence collaborators.
    pub fn events(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<EventEnvelope<GroupEvent>>, EngineError> {
        let slot = self.slot(group_id)?;
        let state = read(&slot, group_id)?;
        Ok(state.log.clone())
    }

    /// Balance read model rebuilt from the group's event stream.
    pub fn balance_view(&self, group_id: GroupId) -> Result<BalanceProjection, EngineError> {
        let slot = self.slot(group_id)?;
        let state = read(&slot, group_id)?;
        let mut runner = ProjectionRunner::new_for_group(group_id, BalanceProjection::new());
        runner.run(&state.log)?;
        Ok(runner.into_projection())
    }

    fn insert(&self, group_id: GroupId, state: GroupState) -> Result<(), EngineError> {
        let mut groups = self
            .groups
            .write()
            .map_err(|_| EngineError::LockPoisoned("group registry".to_string()))?;
        if groups.contains_key(&group_id) {
            return Err(EngineError::DuplicateGroup(group_id));
        }
        groups.insert(group_id, Arc::new(RwLock::new(state)));
        Ok(())
    }

    fn slot(&self, group_id: GroupId) -> Result<GroupSlot, EngineError> {
        let groups = self
            .groups
            .read()
            .map_err(|_| EngineError::LockPoisoned("group registry".to_string()))?;
        groups
            .get(&group_id)
            .cloned()
            .ok_or(EngineError::UnknownGroup(group_id))
    }
}

fn read(
    slot: &GroupSlot,
    group_id: GroupId,
) -> Result<RwLockReadGuard<'_, GroupState>, EngineError> {
    slot.read()
        .map_err(|_| EngineError::LockPoisoned(format!("group {group_id}")))
}

fn write(
    slot: &GroupSlot,
    group_id: GroupId,
) -> Result<RwLockWriteGuard<'_, GroupState>, EngineError> {
    slot.write()
        .map_err(|_| EngineError::LockPoisoned(format!("group {group_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use tallyup_core::ExpenseId;
    use tallyup_events::ProjectionError;
    use tallyup_ledger::LedgerError;
    use tallyup_ledger::group::{AddMember, ExpenseCommand};
    use tallyup_splits::SplitStrategy;

    fn service() -> GroupService {
        GroupService::new(&EngineConfig::default()).unwrap()
    }

    fn group() -> GroupId {
        GroupId::from_u128(1)
    }

    fn member(n: u128) -> MemberId {
        MemberId::from_u128(n)
    }

    fn add(n: u128) -> GroupCommand {
        GroupCommand::AddMember(AddMember {
            group_id: group(),
            member_id: member(n),
            name: format!("member-{n}"),
            external_ref: None,
            weight: Decimal::ONE,
            occurred_at: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    fn record(id: u128, amount: i64, payer: u128) -> GroupCommand {
        GroupCommand::RecordExpense(ExpenseCommand {
            group_id: group(),
            expense: Expense::new(
                ExpenseId::from_u128(id),
                Money::from_minor(amount),
                Currency::usd(),
                member(payer),
                vec![member(1), member(2), member(3)],
                SplitStrategy::Equal,
            ),
            occurred_at: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    fn seeded() -> GroupService {
        let service = service();
        service.create_group(group()).unwrap();
        for n in 1..=3 {
            service.execute(group(), add(n), ExpectedVersion::Any).unwrap();
        }
        service
    }

    #[test]
    fn unknown_and_duplicate_groups() {
        let service = service();
        assert!(matches!(
            service.balances(group()),
            Err(EngineError::UnknownGroup(_))
        ));
        service.create_group(group()).unwrap();
        assert!(matches!(
            service.create_group(group()),
            Err(EngineError::DuplicateGroup(_))
        ));
        assert_eq!(service.group_ids().unwrap(), vec![group()]);
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let service = seeded();
        service
            .execute(group(), record(1, 900, 1), ExpectedVersion::Exact(3))
            .unwrap();
        let err = service
            .execute(group(), record(2, 900, 2), ExpectedVersion::Exact(3))
            .unwrap_err();
        assert!(matches!(err, EngineError::Concurrency(_)));
        assert_eq!(service.snapshot(group()).unwrap().version(), 4);
    }

    #[test]
    fn rejected_commands_leave_no_trace() {
        let service = seeded();
        let before = service.events(group()).unwrap();
        let err = service
            .execute(group(), record(1, 0, 1), ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ledger(LedgerError::NegativeOrZeroAmount(_))
        ));
        assert_eq!(service.events(group()).unwrap(), before);
    }

    #[test]
    fn transfers_settle_the_snapshot() {
        let service = seeded();
        service
            .execute(group(), record(1, 9_000, 1), ExpectedVersion::Any)
            .unwrap();
        let transfers = service.simplified_transfers(group()).unwrap();
        assert_eq!(transfers.len(), 2);
        assert!(transfers.iter().all(|t| t.to == member(1)));
        assert!(transfers.iter().all(|t| t.amount == Money::from_minor(3_000)));
    }

    #[test]
    fn concurrent_writers_keep_the_group_consistent() {
        let service = seeded();
        std::thread::scope(|scope| {
            for worker in 0..4u128 {
                let service = &service;
                scope.spawn(move || {
                    for i in 0..25u128 {
                        let id = worker * 1_000 + i + 1;
                        let cmd = record(id, 1_001 + i as i64, worker % 3 + 1);
                        service.execute(group(), cmd, ExpectedVersion::Any).unwrap();
                        let balances = service.balances(group()).unwrap();
                        assert_eq!(balances.values().copied().sum::<Money>(), Money::ZERO);
                    }
                });
            }
        });

        let snapshot = service.snapshot(group()).unwrap();
        assert_eq!(snapshot.expenses().count(), 100);
        assert_eq!(snapshot.version(), 103);

        let events = service.events(group()).unwrap();
        let seqs: Vec<u64> = events.iter().map(EventEnvelope::sequence_number).collect();
        assert_eq!(seqs, (1..=103).collect::<Vec<u64>>());
        assert_eq!(service.balance_view(group()).unwrap().balances(), snapshot.balances());
    }

    #[test]
    fn restoring_from_events_reproduces_the_group() {
        let service = seeded();
        service
            .execute(group(), record(1, 1_000, 2), ExpectedVersion::Any)
            .unwrap();
        let events = service.events(group()).unwrap();

        let other = GroupService::new(&EngineConfig::default()).unwrap();
        other.restore_group(group(), Currency::usd(), events.clone()).unwrap();
        assert_eq!(
            other.balances(group()).unwrap(),
            service.balances(group()).unwrap()
        );

        let mut shuffled = events;
        shuffled.swap(0, 1);
        let third = GroupService::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            third.restore_group(group(), Currency::usd(), shuffled),
            Err(EngineError::Projection(ProjectionError::NonMonotonicSequence { .. }))
        ));
    }

    fn renumbered(
        events: &[EventEnvelope<GroupEvent>],
        seqs: &[u64],
    ) -> Vec<EventEnvelope<GroupEvent>> {
        events
            .iter()
            .zip(seqs)
            .map(|(env, seq)| {
                EventEnvelope::new(Uuid::now_v7(), group(), *seq, env.payload().clone())
            })
            .collect()
    }

    #[test]
    fn restored_streams_with_gaps_keep_numbering_forward() {
        let events = seeded().events(group()).unwrap();
        let service = service();
        service
            .restore_group(group(), Currency::usd(), renumbered(&events, &[1, 2, 5]))
            .unwrap();

        let committed = service
            .execute(group(), add(4), ExpectedVersion::Exact(3))
            .unwrap();
        assert_eq!(committed[0].sequence_number(), 6);

        let seqs: Vec<u64> = service
            .events(group())
            .unwrap()
            .iter()
            .map(EventEnvelope::sequence_number)
            .collect();
        assert_eq!(seqs, vec![1, 2, 5, 6]);
        assert_eq!(service.balance_view(group()).unwrap().rows().count(), 4);
    }

    #[test]
    fn streams_that_do_not_replay_cleanly_are_refused() {
        let source = seeded();
        source
            .execute(group(), record(1, 900, 1), ExpectedVersion::Any)
            .unwrap();
        let mut events = source.events(group()).unwrap();
        events.remove(1);

        let service = service();
        let err = service
            .restore_group(group(), Currency::usd(), events)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ledger(LedgerError::UnknownMember(m)) if m == member(2)
        ));
        assert!(matches!(
            service.balances(group()),
            Err(EngineError::UnknownGroup(_))
        ));
    }
}
