//! Period math that does not touch the database: bounds, snapshots, rollover.

mod period;
mod rollover;

pub(crate) use period::{
    build_period, category_actual, days_elapsed, month_bounds, months_before, next_period_bounds,
    total_days, PeriodDraft,
};
pub(crate) use rollover::compute_rollover;
