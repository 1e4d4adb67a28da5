use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tallyup_core::{MemberId, Money};

/// One payment of the settle-up plan: `from` pays `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedTransfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

/// Balances after every transfer is paid.
///
/// Paying raises the payer's balance and lowers the receiver's, exactly like a
/// recorded settlement. Members missing from `balances` start at zero.
pub fn apply_transfers(
    balances: &BTreeMap<MemberId, Money>,
    transfers: &[SimplifiedTransfer],
) -> BTreeMap<MemberId, Money> {
    let mut after = balances.clone();
    for transfer in transfers {
        *after.entry(transfer.from).or_insert(Money::ZERO) += transfer.amount;
        *after.entry(transfer.to).or_insert(Money::ZERO) -= transfer.amount;
    }
    after
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paying_moves_balance_from_receiver_to_payer() {
        let a = MemberId::from_u128(1);
        let b = MemberId::from_u128(2);
        let balances = BTreeMap::from([(a, Money::from_minor(500)), (b, Money::from_minor(-500))]);
        let after = apply_transfers(
            &balances,
            &[SimplifiedTransfer {
                from: b,
                to: a,
                amount: Money::from_minor(500),
            }],
        );
        assert!(after.values().all(|m| m.is_zero()));
    }

    #[test]
    fn serializes_as_plain_object() {
        let transfer = SimplifiedTransfer {
            from: MemberId::from_u128(1),
            to: MemberId::from_u128(2),
            amount: Money::from_minor(1_000),
        };
        let json = serde_json::to_value(transfer).unwrap();
        assert_eq!(json["amount"], 1_000);
        assert!(json["from"].is_string());
    }
}
