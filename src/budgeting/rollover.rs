use rust_decimal::Decimal;

use crate::models::RolloverType;

/// Amount a closed category carries into the next period.
///
/// Nothing carries for `NONE` or when the effective budget was fully used.
/// Otherwise the unspent remainder carries, limited by the cap when one is set.
pub(crate) fn compute_rollover(
    rollover_type: RolloverType,
    rollover_cap: Option<Decimal>,
    effective_budget: Decimal,
    actual: Decimal,
) -> Decimal {
    if rollover_type == RolloverType::None || actual >= effective_budget {
        return Decimal::ZERO;
    }
    let unspent = effective_budget - actual;
    match rollover_cap {
        Some(cap) => unspent.min(cap),
        None => unspent,
    }
}
