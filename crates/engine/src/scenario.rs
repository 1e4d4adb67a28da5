//! JSON scenarios for the `tallyup` binary.
//!
//! A scenario names members by display name and amounts in major units, which
//! keeps hand-written files readable. Running it replays everything through a
//! fresh [`GroupService`] and reports final balances plus the settle-up plan.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{Currency, ExpectedVersion, ExpenseId, GroupId, MemberId, Money, SettlementId};
use tallyup_ledger::group::{AddMember, ExpenseCommand, MemberRef, RecordSettlement};
use tallyup_ledger::{Expense, GroupCommand, Settlement};
use tallyup_splits::{Contribution, SplitStrategy};

use crate::error::EngineError;
use crate::service::GroupService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// ISO code; the service default when absent.
    #[serde(default)]
    pub currency: Option<String>,
    pub members: Vec<ScenarioMember>,
    #[serde(default)]
    pub expenses: Vec<ScenarioExpense>,
    #[serde(default)]
    pub settlements: Vec<ScenarioSettlement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMember {
    pub name: String,
    #[serde(default = "one")]
    pub weight: Decimal,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default = "yes")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioExpense {
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    /// Single payer paying the full amount.
    #[serde(default)]
    pub payer: Option<String>,
    /// Several payers with the part each paid; overrides `payer`.
    #[serde(default)]
    pub payers: BTreeMap<String, Decimal>,
    pub participants: Vec<String>,
    #[serde(default)]
    pub split: ScenarioSplit,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// [`SplitStrategy`] keyed by member name, exact amounts in major units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioSplit {
    #[default]
    Equal,
    Equity,
    Exact { amounts: BTreeMap<String, Decimal> },
    Percentage { percentages: BTreeMap<String, Decimal> },
    Shares { shares: BTreeMap<String, Decimal> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSettlement {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Outcome of a scenario run, amounts in major units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub currency: String,
    pub balances: Vec<BalanceLine>,
    pub transfers: Vec<TransferLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub member: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

fn one() -> Decimal {
    Decimal::ONE
}

fn yes() -> bool {
    true
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|err| EngineError::Input(err.to_string()))
    }

    /// Replay the scenario on `service` as a new group.
    pub fn run(&self, service: &GroupService) -> Result<Report, EngineError> {
        let currency = match &self.currency {
            Some(code) => Currency::iso(code)?,
            None => service.default_currency().clone(),
        };
        let group_id = GroupId::new();
        service.create_group_in(group_id, currency.clone())?;

        let mut roster = Roster::default();
        for (idx, member) in self.members.iter().enumerate() {
            let member_id = MemberId::from_u128(idx as u128 + 1);
            roster.insert(&member.name, member_id)?;
            submit(service, group_id, GroupCommand::AddMember(AddMember {
                group_id,
                member_id,
                name: member.name.clone(),
                external_ref: member.external_ref.clone(),
                weight: member.weight,
                occurred_at: now(),
            }))?;
        }

        for (idx, raw) in self.expenses.iter().enumerate() {
            let id = ExpenseId::from_u128(idx as u128 + 1);
            let expense = raw.to_expense(id, &currency, &roster)?;
            submit(service, group_id, GroupCommand::RecordExpense(ExpenseCommand {
                group_id,
                expense,
                occurred_at: now(),
            }))?;
        }

        for (idx, raw) in self.settlements.iter().enumerate() {
            let mut settlement = Settlement::new(
                SettlementId::from_u128(idx as u128 + 1),
                roster.id(&raw.from)?,
                roster.id(&raw.to)?,
                Money::from_decimal(raw.amount, &currency)?,
                currency.clone(),
            );
            if let Some(date) = raw.date {
                settlement = settlement.on(date);
            }
            submit(service, group_id, GroupCommand::RecordSettlement(RecordSettlement {
                group_id,
                settlement,
                occurred_at: now(),
            }))?;
        }

        // Inactive members still carry their history; switch them off last.
        for member in self.members.iter().filter(|m| !m.active) {
            submit(service, group_id, GroupCommand::DeactivateMember(MemberRef {
                group_id,
                member_id: roster.id(&member.name)?,
                occurred_at: now(),
            }))?;
        }

        let balances = service
            .balances(group_id)?
            .into_iter()
            .map(|(id, balance)| BalanceLine {
                member: roster.name(id).to_string(),
                balance: balance.to_decimal(&currency),
            })
            .collect();
        let transfers = service
            .simplified_transfers(group_id)?
            .into_iter()
            .map(|t| TransferLine {
                from: roster.name(t.from).to_string(),
                to: roster.name(t.to).to_string(),
                amount: t.amount.to_decimal(&currency),
            })
            .collect();

        Ok(Report {
            currency: currency.code().to_string(),
            balances,
            transfers,
        })
    }
}

impl ScenarioExpense {
    fn to_expense(
        &self,
        id: ExpenseId,
        currency: &Currency,
        roster: &Roster,
    ) -> Result<Expense, EngineError> {
        let amount = Money::from_decimal(self.amount, currency)?;
        let participants = self
            .participants
            .iter()
            .map(|name| roster.id(name))
            .collect::<Result<Vec<_>, _>>()?;

        let payers = if self.payers.is_empty() {
            let payer = self
                .payer
                .as_deref()
                .ok_or_else(|| {
                    EngineError::Input(format!("expense '{}' has no payer", self.description))
                })?;
            vec![Contribution::new(roster.id(payer)?, amount)]
        } else {
            self.payers
                .iter()
                .map(|(name, paid)| {
                    Ok(Contribution::new(roster.id(name)?, Money::from_decimal(*paid, currency)?))
                })
                .collect::<Result<Vec<_>, EngineError>>()?
        };

        let strategy = match &self.split {
            ScenarioSplit::Equal => SplitStrategy::Equal,
            ScenarioSplit::Equity => SplitStrategy::Equity,
            ScenarioSplit::Exact { amounts } => SplitStrategy::Exact {
                amounts: roster.rekey(amounts, |v| Ok(Money::from_decimal(*v, currency)?))?,
            },
            ScenarioSplit::Percentage { percentages } => SplitStrategy::Percentage {
                percentages: roster.rekey(percentages, |v| Ok(*v))?,
            },
            ScenarioSplit::Shares { shares } => SplitStrategy::Shares {
                shares: roster.rekey(shares, |v| Ok(*v))?,
            },
        };

        let mut expense = Expense::new(
            id,
            amount,
            currency.clone(),
            payers[0].member_id,
            participants,
            strategy,
        )
        .with_description(self.description.clone())
            .with_payers(payers);
        if let Some(date) = self.date {
            expense = expense.on(date);
        }
        Ok(expense)
    }
}

/// Name <-> id mapping of the scenario's members.
#[derive(Debug, Default)]
struct Roster {
    ids: BTreeMap<String, MemberId>,
    names: BTreeMap<MemberId, String>,
}

impl Roster {
    fn insert(&mut self, name: &str, id: MemberId) -> Result<(), EngineError> {
        if self.ids.insert(name.to_string(), id).is_some() {
            return Err(EngineError::Input(format!("member '{name}' is listed twice")));
        }
        self.names.insert(id, name.to_string());
        Ok(())
    }

    fn id(&self, name: &str) -> Result<MemberId, EngineError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::Input(format!("unknown member '{name}'")))
    }

    fn name(&self, id: MemberId) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or("?")
    }

    fn rekey<T>(
        &self,
        by_name: &BTreeMap<String, Decimal>,
        convert: impl Fn(&Decimal) -> Result<T, EngineError>,
    ) -> Result<BTreeMap<MemberId, T>, EngineError> {
        by_name
            .iter()
            .map(|(name, value)| Ok((self.id(name)?, convert(value)?)))
            .collect()
    }
}

fn submit(
    service: &GroupService,
    group_id: GroupId,
    command: GroupCommand,
) -> Result<(), EngineError> {
    service.execute(group_id, command, ExpectedVersion::Any)?;
    Ok(())
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn run(raw: &str) -> Result<Report, EngineError> {
        let service = GroupService::new(&EngineConfig::default())?;
        Scenario::from_json(raw)?.run(&service)
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn equity_trip() {
        let report = run(r#"{
            "members": [
                { "name": "A", "weight": 1.0 },
                { "name": "B", "weight": 1.5 },
                { "name": "C", "weight": 0.5 }
            ],
            "expenses": [
                { "description": "hotel", "amount": 100, "payer": "A",
                  "participants": ["A", "B", "C"], "split": { "type": "equity" } }
            ]
        }"#)
        .unwrap();

        assert_eq!(report.currency, "USD");
        let balances: Vec<(&str, Decimal)> = report
            .balances
            .iter()
            .map(|b| (b.member.as_str(), b.balance))
            .collect();
        assert_eq!(
            balances,
            vec![("A", dec("66.67")), ("B", dec("-50.00")), ("C", dec("-16.67"))]
        );
        assert_eq!(
            report.transfers,
            vec![
                TransferLine { from: "B".into(), to: "A".into(), amount: dec("50.00") },
                TransferLine { from: "C".into(), to: "A".into(), amount: dec("16.67") },
            ]
        );
    }

    #[test]
    fn settlements_and_exact_splits() {
        let report = run(r#"{
            "currency": "EUR",
            "members": [{ "name": "Ann" }, { "name": "Ben" }],
            "expenses": [
                { "amount": "30.00", "payer": "Ann", "participants": ["Ann", "Ben"],
                  "split": { "type": "exact", "amounts": { "Ann": "10.00", "Ben": "20.00" } } }
            ],
            "settlements": [{ "from": "Ben", "to": "Ann", "amount": "20.00" }]
        }"#)
        .unwrap();

        assert_eq!(report.currency, "EUR");
        assert!(report.balances.iter().all(|b| b.balance.is_zero()));
        assert!(report.transfers.is_empty());
    }

    #[test]
    fn unknown_names_are_reported() {
        let err = run(r#"{
            "members": [{ "name": "Ann" }],
            "expenses": [{ "amount": 5, "payer": "Zed", "participants": ["Ann"] }]
        }"#)
        .unwrap_err();
        assert!(err.to_string().contains("Zed"));
    }

    #[test]
    fn bad_exact_split_is_rejected() {
        let err = run(r#"{
            "members": [{ "name": "Ann" }, { "name": "Ben" }],
            "expenses": [
                { "amount": 30, "payer": "Ann", "participants": ["Ann", "Ben"],
                  "split": { "type": "exact", "amounts": { "Ann": 10, "Ben": 10 } } }
            ]
        }"#)
        .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(_)));
    }
}
