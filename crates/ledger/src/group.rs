use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{
    Aggregate, AggregateRoot, Currency, ExpenseId, GroupId, MemberId, Money, SettlementId,
};
use tallyup_events::{Command, Event};
use tallyup_splits::{Split, SplitCalculator};

use crate::balance::{BalanceDelta, BalanceLedger, validate_weight};
use crate::error::LedgerError;
use crate::expense::{Expense, RecordedExpense};
use crate::member::Member;
use crate::settlement::Settlement;

/// Aggregate root: one group's ledger.
///
/// Holds the authoritative [`BalanceLedger`] plus the book of recorded expenses
/// and settlements needed to reverse them later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLedger {
    id: GroupId,
    ledger: BalanceLedger,
    expenses: BTreeMap<ExpenseId, RecordedExpense>,
    settlements: BTreeMap<SettlementId, Settlement>,
    calculator: SplitCalculator,
    version: u64,
}

impl GroupLedger {
    pub fn new(id: GroupId, currency: Currency) -> Self {
        Self {
            id,
            ledger: BalanceLedger::new(currency),
            expenses: BTreeMap::new(),
            settlements: BTreeMap::new(),
            calculator: SplitCalculator::default(),
            version: 0,
        }
    }

    pub fn with_calculator(mut self, calculator: SplitCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn id_typed(&self) -> GroupId {
        self.id
    }

    pub fn currency(&self) -> &Currency {
        self.ledger.currency()
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn balances(&self) -> BTreeMap<MemberId, Money> {
        self.ledger.balances()
    }

    pub fn expense(&self, id: &ExpenseId) -> Option<&RecordedExpense> {
        self.expenses.get(id)
    }

    pub fn expenses(&self) -> impl Iterator<Item = &RecordedExpense> {
        self.expenses.values()
    }

    pub fn settlement(&self, id: &SettlementId) -> Option<&Settlement> {
        self.settlements.get(id)
    }

    pub fn settlements(&self) -> impl Iterator<Item = &Settlement> {
        self.settlements.values()
    }

    /// Splits `expense` would produce against the current members, without
    /// recording anything.
    pub fn preview_splits(&self, expense: &Expense) -> Result<Vec<Split>, LedgerError> {
        let (splits, _) = self.plan_splits(&self.ledger, expense)?;
        Ok(splits)
    }

    /// Check that `event` fits the current state without applying it.
    ///
    /// Events from `handle` always fit; stored streams are read back through
    /// [`replay_checked`](Self::replay_checked), which uses this.
    pub fn check_event(&self, event: &GroupEvent) -> Result<(), LedgerError> {
        self.ensure_group(event.group_id())?;
        match event {
            GroupEvent::MemberAdded(e) => {
                if self.ledger.member(&e.member_id).is_some() {
                    return Err(LedgerError::DuplicateMember(e.member_id));
                }
                validate_weight(e.member_id, e.weight)
            }
            GroupEvent::MemberWeightChanged(e) => {
                self.known_member(e.member_id)?;
                validate_weight(e.member_id, e.weight)
            }
            GroupEvent::MemberDeactivated(e) | GroupEvent::MemberReactivated(e) => {
                self.known_member(e.member_id).map(|_| ())
            }
            GroupEvent::MemberRemoved(e) => {
                self.known_member(e.member_id)?;
                self.ledger.ensure_removable(e.member_id)?;
                if self.is_referenced(e.member_id) {
                    return Err(LedgerError::MemberReferenced(e.member_id));
                }
                Ok(())
            }
            GroupEvent::ExpenseRecorded(e) => {
                let recorded = &e.recorded;
                if self.expenses.contains_key(&recorded.expense.id) {
                    return Err(LedgerError::DuplicateExpense(recorded.expense.id));
                }
                self.ledger
                    .plan_expense(&recorded.expense, &recorded.splits)
                    .map(|_| ())
            }
            GroupEvent::ExpenseEdited(e) => {
                self.ensure_recorded(&e.previous)?;
                if e.current.expense.id != e.previous.expense.id {
                    return Err(LedgerError::invalid(format!(
                        "edit of expense {} carries expense {}",
                        e.previous.expense.id, e.current.expense.id
                    )));
                }
                let mut scratch = self.ledger.clone();
                let reversal =
                    scratch.plan_expense_reversal(&e.previous.expense, &e.previous.splits)?;
                scratch.commit(&reversal);
                scratch
                    .plan_expense(&e.current.expense, &e.current.splits)
                    .map(|_| ())
            }
            GroupEvent::ExpenseDeleted(e) => {
                self.ensure_recorded(&e.recorded)?;
                self.ledger
                    .plan_expense_reversal(&e.recorded.expense, &e.recorded.splits)
                    .map(|_| ())
            }
            GroupEvent::SettlementRecorded(e) => {
                if self.settlements.contains_key(&e.settlement.id) {
                    return Err(LedgerError::DuplicateSettlement(e.settlement.id));
                }
                self.ledger.plan_settlement(&e.settlement).map(|_| ())
            }
            GroupEvent::SettlementDeleted(e) => {
                let stored = self
                    .settlements
                    .get(&e.settlement.id)
                    .ok_or(LedgerError::UnknownSettlement(e.settlement.id))?;
                if *stored != e.settlement {
                    return Err(LedgerError::invalid(format!(
                        "settlement {} differs from the recorded one",
                        e.settlement.id
                    )));
                }
                self.ledger.plan_settlement_reversal(stored).map(|_| ())
            }
        }
    }

    /// Rehydrate from a stored stream, stopping at the first event that does
    /// not fit. The aggregate is left half-replayed on error and should be
    /// dropped.
    pub fn replay_checked<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a GroupEvent>,
    ) -> Result<(), LedgerError> {
        for event in events {
            self.check_event(event)?;
            self.apply(event);
        }
        Ok(())
    }
}

impl AggregateRoot for GroupLedger {
    type Id = GroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMember {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub name: String,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: Decimal,
    pub occurred_at: DateTime<Utc>,
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

/// Command: UpdateMemberWeight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMemberWeight {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub weight: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateMember / ReactivateMember / RemoveMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordExpense / EditExpense.
///
/// For an edit, `expense.id` names the recorded expense being replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseCommand {
    pub group_id: GroupId,
    pub expense: Expense,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteExpense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteExpense {
    pub group_id: GroupId,
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSettlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSettlement {
    pub group_id: GroupId,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteSettlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSettlement {
    pub group_id: GroupId,
    pub settlement_id: SettlementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCommand {
    AddMember(AddMember),
    UpdateMemberWeight(UpdateMemberWeight),
    DeactivateMember(MemberRef),
    ReactivateMember(MemberRef),
    RemoveMember(MemberRef),
    RecordExpense(ExpenseCommand),
    EditExpense(ExpenseCommand),
    DeleteExpense(DeleteExpense),
    RecordSettlement(RecordSettlement),
    DeleteSettlement(DeleteSettlement),
}

impl Command for GroupCommand {
    fn target_group_id(&self) -> GroupId {
        match self {
            GroupCommand::AddMember(c) => c.group_id,
            GroupCommand::UpdateMemberWeight(c) => c.group_id,
            GroupCommand::DeactivateMember(c)
            | GroupCommand::ReactivateMember(c)
            | GroupCommand::RemoveMember(c) => c.group_id,
            GroupCommand::RecordExpense(c) | GroupCommand::EditExpense(c) => c.group_id,
            GroupCommand::DeleteExpense(c) => c.group_id,
            GroupCommand::RecordSettlement(c) => c.group_id,
            GroupCommand::DeleteSettlement(c) => c.group_id,
        }
    }
}

/// Event: MemberAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub name: String,
    pub external_ref: Option<String>,
    pub weight: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberWeightChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberWeightChanged {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub weight: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberDeactivated / MemberReactivated / MemberRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberChanged {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseRecorded. Carries the splits that were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecorded {
    pub group_id: GroupId,
    pub recorded: RecordedExpense,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseEdited. The previous splits are reversed, the new ones applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseEdited {
    pub group_id: GroupId,
    pub previous: RecordedExpense,
    pub current: RecordedExpense,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseDeleted. Carries the splits that were reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDeleted {
    pub group_id: GroupId,
    pub recorded: RecordedExpense,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SettlementRecorded / SettlementDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementChanged {
    pub group_id: GroupId,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    MemberAdded(MemberAdded),
    MemberWeightChanged(MemberWeightChanged),
    MemberDeactivated(MemberChanged),
    MemberReactivated(MemberChanged),
    MemberRemoved(MemberChanged),
    ExpenseRecorded(ExpenseRecorded),
    ExpenseEdited(ExpenseEdited),
    ExpenseDeleted(ExpenseDeleted),
    SettlementRecorded(SettlementChanged),
    SettlementDeleted(SettlementChanged),
}

impl GroupEvent {
    pub fn group_id(&self) -> GroupId {
        match self {
            GroupEvent::MemberAdded(e) => e.group_id,
            GroupEvent::MemberWeightChanged(e) => e.group_id,
            GroupEvent::MemberDeactivated(e)
            | GroupEvent::MemberReactivated(e)
            | GroupEvent::MemberRemoved(e) => e.group_id,
            GroupEvent::ExpenseRecorded(e) => e.group_id,
            GroupEvent::ExpenseEdited(e) => e.group_id,
            GroupEvent::ExpenseDeleted(e) => e.group_id,
            GroupEvent::SettlementRecorded(e) | GroupEvent::SettlementDeleted(e) => e.group_id,
        }
    }

    /// Net balance effect of this event; empty for membership events.
    pub fn balance_delta(&self) -> BalanceDelta {
        match self {
            GroupEvent::ExpenseRecorded(e) => BalanceDelta::from_splits(&e.recorded.splits),
            GroupEvent::ExpenseEdited(e) => {
                let mut splits: Vec<Split> = e.current.splits.clone();
                splits.extend(e.previous.splits.iter().map(|s| Split {
                    owed: -s.owed,
                    paid: -s.paid,
                    ..s.clone()
                }));
                BalanceDelta::from_splits(&splits)
            }
            GroupEvent::ExpenseDeleted(e) => {
                BalanceDelta::from_splits(&e.recorded.splits).reversed()
            }
            GroupEvent::SettlementRecorded(e) => BalanceDelta::from_settlement(&e.settlement),
            GroupEvent::SettlementDeleted(e) => {
                BalanceDelta::from_settlement(&e.settlement).reversed()
            }
            _ => BalanceDelta::default(),
        }
    }
}

impl Event for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::MemberAdded(_) => "ledger.member.added",
            GroupEvent::MemberWeightChanged(_) => "ledger.member.weight_changed",
            GroupEvent::MemberDeactivated(_) => "ledger.member.deactivated",
            GroupEvent::MemberReactivated(_) => "ledger.member.reactivated",
            GroupEvent::MemberRemoved(_) => "ledger.member.removed",
            GroupEvent::ExpenseRecorded(_) => "ledger.expense.recorded",
            GroupEvent::ExpenseEdited(_) => "ledger.expense.edited",
            GroupEvent::ExpenseDeleted(_) => "ledger.expense.deleted",
            GroupEvent::SettlementRecorded(_) => "ledger.settlement.recorded",
            GroupEvent::SettlementDeleted(_) => "ledger.settlement.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::MemberAdded(e) => e.occurred_at,
            GroupEvent::MemberWeightChanged(e) => e.occurred_at,
            GroupEvent::MemberDeactivated(e)
            | GroupEvent::MemberReactivated(e)
            | GroupEvent::MemberRemoved(e) => e.occurred_at,
            GroupEvent::ExpenseRecorded(e) => e.occurred_at,
            GroupEvent::ExpenseEdited(e) => e.occurred_at,
            GroupEvent::ExpenseDeleted(e) => e.occurred_at,
            GroupEvent::SettlementRecorded(e) | GroupEvent::SettlementDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for GroupLedger {
    type Command = GroupCommand;
    type Event = GroupEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        let outcome = match event {
            GroupEvent::MemberAdded(e) => {
                let mut member = Member::new(e.member_id, e.name.clone()).with_weight(e.weight);
                if let Some(external_ref) = &e.external_ref {
                    member = member.with_external_ref(external_ref.clone());
                }
                self.ledger.add_member(member)
            }
            GroupEvent::MemberWeightChanged(e) => self.ledger.set_weight(e.member_id, e.weight),
            GroupEvent::MemberDeactivated(e) => self.ledger.deactivate_member(e.member_id),
            GroupEvent::MemberReactivated(e) => self.ledger.reactivate_member(e.member_id),
            GroupEvent::MemberRemoved(e) => self.ledger.remove_member(e.member_id).map(|_| ()),
            GroupEvent::ExpenseRecorded(e) => {
                self.ledger.commit(&event.balance_delta());
                self.expenses
                    .insert(e.recorded.expense.id, e.recorded.clone());
                Ok(())
            }
            GroupEvent::ExpenseEdited(e) => {
                self.ledger.commit(&event.balance_delta());
                self.expenses.insert(e.current.expense.id, e.current.clone());
                Ok(())
            }
            GroupEvent::ExpenseDeleted(e) => {
                self.ledger.commit(&event.balance_delta());
                self.expenses.remove(&e.recorded.expense.id);
                Ok(())
            }
            GroupEvent::SettlementRecorded(e) => {
                self.ledger.commit(&event.balance_delta());
                self.settlements
                    .insert(e.settlement.id, e.settlement.clone());
                Ok(())
            }
            GroupEvent::SettlementDeleted(e) => {
                self.ledger.commit(&event.balance_delta());
                self.settlements.remove(&e.settlement.id);
                Ok(())
            }
        };

        // Events come out of `handle`, which already checked them.
        if let Err(err) = outcome {
            tracing::error!(
                group = %self.id,
                event = event.event_type(),
                %err,
                "event does not fit ledger state"
            );
        }

        self.version += 1;
        tracing::info!(
            group = %self.id,
            event = event.event_type(),
            version = self.version,
            "ledger event applied"
        );
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let decided = self.ensure_group(command.target_group_id()).and_then(|_| match command {
            GroupCommand::AddMember(cmd) => self.handle_add_member(cmd),
            GroupCommand::UpdateMemberWeight(cmd) => self.handle_update_weight(cmd),
            GroupCommand::DeactivateMember(cmd) => self.handle_deactivate(cmd),
            GroupCommand::ReactivateMember(cmd) => self.handle_reactivate(cmd),
            GroupCommand::RemoveMember(cmd) => self.handle_remove_member(cmd),
            GroupCommand::RecordExpense(cmd) => self.handle_record_expense(cmd),
            GroupCommand::EditExpense(cmd) => self.handle_edit_expense(cmd),
            GroupCommand::DeleteExpense(cmd) => self.handle_delete_expense(cmd),
            GroupCommand::RecordSettlement(cmd) => self.handle_record_settlement(cmd),
            GroupCommand::DeleteSettlement(cmd) => self.handle_delete_settlement(cmd),
        });

        if let Err(err) = &decided {
            tracing::warn!(group = %self.id, %err, "command rejected");
        }
        decided
    }
}

impl GroupLedger {
    fn ensure_group(&self, group_id: GroupId) -> Result<(), LedgerError> {
        if self.id != group_id {
            return Err(LedgerError::GroupMismatch {
                expected: self.id,
                found: group_id,
            });
        }
        Ok(())
    }

    /// A stored event must name the expense exactly as it was recorded.
    fn ensure_recorded(&self, recorded: &RecordedExpense) -> Result<(), LedgerError> {
        let id = recorded.expense.id;
        let stored = self.expenses.get(&id).ok_or(LedgerError::UnknownExpense(id))?;
        if stored != recorded {
            return Err(LedgerError::invalid(format!(
                "expense {id} differs from the recorded one"
            )));
        }
        Ok(())
    }

    fn known_member(&self, member_id: MemberId) -> Result<&Member, LedgerError> {
        self.ledger
            .member(&member_id)
            .ok_or(LedgerError::UnknownMember(member_id))
    }

    /// Run the calculator for `expense` against `ledger` and plan its delta.
    fn plan_splits(
        &self,
        ledger: &BalanceLedger,
        expense: &Expense,
    ) -> Result<(Vec<Split>, BalanceDelta), LedgerError> {
        expense.validate()?;
        let participants = ledger.participants_for(&expense.participants)?;
        let owed = self
            .calculator
            .compute(expense.amount, &participants, &expense.strategy)?;
        let splits = Split::assemble(&owed, &expense.strategy, &expense.payers);
        let delta = ledger.plan_expense(expense, &splits)?;
        Ok((splits, delta))
    }

    fn is_referenced(&self, member_id: MemberId) -> bool {
        self.expenses.values().any(|r| {
            r.expense.touched_members().contains(&member_id)
                || r.splits.iter().any(|s| s.member_id == member_id)
        }) || self
            .settlements
            .values()
            .any(|s| s.from == member_id || s.to == member_id)
    }

    fn handle_add_member(&self, cmd: &AddMember) -> Result<Vec<GroupEvent>, LedgerError> {
        if self.ledger.member(&cmd.member_id).is_some() {
            return Err(LedgerError::DuplicateMember(cmd.member_id));
        }
        if cmd.name.trim().is_empty() {
            return Err(LedgerError::invalid("member name cannot be empty"));
        }
        if cmd.weight <= Decimal::ZERO {
            return Err(LedgerError::invalid(format!(
                "weight of {} must be positive, got {}",
                cmd.member_id, cmd.weight
            )));
        }
        Ok(vec![GroupEvent::MemberAdded(MemberAdded {
            group_id: cmd.group_id,
            member_id: cmd.member_id,
            name: cmd.name.trim().to_string(),
            external_ref: cmd.external_ref.clone(),
            weight: cmd.weight,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_weight(
        &self,
        cmd: &UpdateMemberWeight,
    ) -> Result<Vec<GroupEvent>, LedgerError> {
        self.known_member(cmd.member_id)?;
        if cmd.weight <= Decimal::ZERO {
            return Err(LedgerError::invalid(format!(
                "weight of {} must be positive, got {}",
                cmd.member_id, cmd.weight
            )));
        }
        Ok(vec![GroupEvent::MemberWeightChanged(MemberWeightChanged {
            group_id: cmd.group_id,
            member_id: cmd.member_id,
            weight: cmd.weight,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &MemberRef) -> Result<Vec<GroupEvent>, LedgerError> {
        let member = self.known_member(cmd.member_id)?;
        if !member.is_active() {
            return Ok(vec![]);
        }
        Ok(vec![GroupEvent::MemberDeactivated(member_changed(cmd))])
    }

    fn handle_reactivate(&self, cmd: &MemberRef) -> Result<Vec<GroupEvent>, LedgerError> {
        let member = self.known_member(cmd.member_id)?;
        if member.is_active() {
            return Ok(vec![]);
        }
        Ok(vec![GroupEvent::MemberReactivated(member_changed(cmd))])
    }

    fn handle_remove_member(&self, cmd: &MemberRef) -> Result<Vec<GroupEvent>, LedgerError> {
        self.known_member(cmd.member_id)?;
        self.ledger.ensure_removable(cmd.member_id)?;
        if self.is_referenced(cmd.member_id) {
            return Err(LedgerError::MemberReferenced(cmd.member_id));
        }
        Ok(vec![GroupEvent::MemberRemoved(member_changed(cmd))])
    }

    fn handle_record_expense(
        &self,
        cmd: &ExpenseCommand,
    ) -> Result<Vec<GroupEvent>, LedgerError> {
        if self.expenses.contains_key(&cmd.expense.id) {
            return Err(LedgerError::DuplicateExpense(cmd.expense.id));
        }
        let (splits, _) = self.plan_splits(&self.ledger, &cmd.expense)?;
        tracing::debug!(expense = %cmd.expense.id, splits = splits.len(), "expense planned");

        Ok(vec![GroupEvent::ExpenseRecorded(ExpenseRecorded {
            group_id: cmd.group_id,
            recorded: RecordedExpense {
                expense: cmd.expense.clone(),
                splits,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Reverse the recorded splits on a scratch copy, then plan the new ones
    /// against it, so the edit either fully succeeds or changes nothing.
    fn handle_edit_expense(&self, cmd: &ExpenseCommand) -> Result<Vec<GroupEvent>, LedgerError> {
        let previous = self
            .expenses
            .get(&cmd.expense.id)
            .ok_or(LedgerError::UnknownExpense(cmd.expense.id))?;

        let mut scratch = self.ledger.clone();
        let reversal = scratch.plan_expense_reversal(&previous.expense, &previous.splits)?;
        scratch.commit(&reversal);
        let (splits, _) = self.plan_splits(&scratch, &cmd.expense)?;

        Ok(vec![GroupEvent::ExpenseEdited(ExpenseEdited {
            group_id: cmd.group_id,
            previous: previous.clone(),
            current: RecordedExpense {
                expense: cmd.expense.clone(),
                splits,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete_expense(&self, cmd: &DeleteExpense) -> Result<Vec<GroupEvent>, LedgerError> {
        let recorded = self
            .expenses
            .get(&cmd.expense_id)
            .ok_or(LedgerError::UnknownExpense(cmd.expense_id))?;
        self.ledger
            .plan_expense_reversal(&recorded.expense, &recorded.splits)?;

        Ok(vec![GroupEvent::ExpenseDeleted(ExpenseDeleted {
            group_id: cmd.group_id,
            recorded: recorded.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_settlement(
        &self,
        cmd: &RecordSettlement,
    ) -> Result<Vec<GroupEvent>, LedgerError> {
        if self.settlements.contains_key(&cmd.settlement.id) {
            return Err(LedgerError::DuplicateSettlement(cmd.settlement.id));
        }
        self.ledger.plan_settlement(&cmd.settlement)?;

        Ok(vec![GroupEvent::SettlementRecorded(SettlementChanged {
            group_id: cmd.group_id,
            settlement: cmd.settlement.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete_settlement(
        &self,
        cmd: &DeleteSettlement,
    ) -> Result<Vec<GroupEvent>, LedgerError> {
        let settlement = self
            .settlements
            .get(&cmd.settlement_id)
            .ok_or(LedgerError::UnknownSettlement(cmd.settlement_id))?;
        self.ledger.plan_settlement_reversal(settlement)?;

        Ok(vec![GroupEvent::SettlementDeleted(SettlementChanged {
            group_id: cmd.group_id,
            settlement: settlement.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn member_changed(cmd: &MemberRef) -> MemberChanged {
    MemberChanged {
        group_id: cmd.group_id,
        member_id: cmd.member_id,
        occurred_at: cmd.occurred_at,
    }
}
