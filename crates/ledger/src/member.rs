use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallyup_core::{Entity, MemberId, Money};

/// A group participant and their running balance.
///
/// Positive balance: the group owes them. Negative: they owe the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    name: String,
    /// Link to an identity outside the group; `None` for ghost members.
    external_ref: Option<String>,
    weight: Decimal,
    balance: Money,
    active: bool,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            external_ref: None,
            weight: Decimal::ONE,
            balance: Money::ZERO,
            active: true,
        }
    }

    pub fn with_weight(mut self, weight: Decimal) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn id_typed(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    /// Tracked only within the group, with no linked identity.
    pub fn is_ghost(&self) -> bool {
        self.external_ref.is_none()
    }

    pub fn weight(&self) -> Decimal {
        self.weight
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_weight(&mut self, weight: Decimal) {
        self.weight = weight;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn credit(&mut self, delta: Money) {
        self.balance += delta;
    }
}

impl Entity for Member {
    type Id = MemberId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
