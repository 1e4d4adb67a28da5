//! Minor-unit rounding and remainder reconciliation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use tallyup_core::Money;

use crate::error::SplitError;

/// Divide `amount` proportionally to `ratios`, rounding each share half away from
/// zero to the minor unit. The result does not necessarily sum to `amount`; see
/// [`reconcile`].
pub(crate) fn allocate_proportionally(
    amount: Money,
    ratios: &[Decimal],
) -> Result<Vec<i64>, SplitError> {
    let total = ratios
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(*r))
        .ok_or_else(|| SplitError::invalid("ratio total overflows"))?;
    if total <= Decimal::ZERO {
        return Err(SplitError::invalid("ratio total must be positive"));
    }

    let whole = Decimal::from(amount.minor());
    ratios
        .iter()
        .map(|ratio| {
            whole
                .checked_mul(*ratio)
                .and_then(|v| v.checked_div(total))
                .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
                .and_then(|v| v.to_i64())
                .ok_or_else(|| SplitError::invalid(format!("share of {amount} overflows")))
        })
        .collect()
}

/// Make `owed` sum to `amount` exactly.
///
/// The remainder is handed out one minor unit at a time in participant order,
/// starting with the first participant. A negative remainder skips participants
/// who already owe nothing. A remainder larger than one unit per participant
/// cannot come from rounding and is refused.
pub(crate) fn reconcile(amount: Money, mut owed: Vec<i64>) -> Result<Vec<i64>, SplitError> {
    let participants = owed.len();
    let assigned: i128 = owed.iter().map(|v| i128::from(*v)).sum();
    let remainder = i128::from(amount.minor()) - assigned;

    if remainder.unsigned_abs() > participants as u128 {
        return Err(SplitError::RoundingOverflow {
            remainder: i64::try_from(remainder).unwrap_or(i64::MAX),
            participants,
        });
    }

    let mut remaining = remainder;
    let step = remainder.signum() as i64;
    let mut idx = 0;
    while remaining != 0 {
        let slot = &mut owed[idx % participants];
        if step > 0 || *slot > 0 {
            *slot += step;
            remaining -= i128::from(step);
        }
        idx += 1;
    }

    Ok(owed)
}
