use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, warn};

use super::{JobContext, JobReport};
use crate::db::Database;

/// Close every open period that ended before today, for every active budget.
pub(super) fn close_due_periods(ctx: &mut JobContext<'_>) -> Result<JobReport> {
    let mut report = JobReport::default();
    for budget in ctx.db.get_active_budgets()? {
        let Some(budget_id) = budget.id else {
            continue;
        };
        match close_budget(ctx.db, budget_id, ctx.today, ctx.now) {
            Ok(closed) => {
                report.processed += 1;
                report.periods_closed += closed;
            }
            Err(err) => {
                report.failed += 1;
                error!(budget_id, error = %err, "Failed to close periods");
            }
        }
    }
    Ok(report)
}

/// Catch a budget up to `today`, one month at a time. Returns how many
/// periods were closed.
fn close_budget(
    db: &mut Database,
    budget_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut closed = 0;
    loop {
        let Some(period) = db.get_open_period(budget_id)? else {
            warn!(budget_id, "Active budget has no open period, opening one");
            db.open_period(budget_id, today)?;
            return Ok(closed);
        };
        if period.period_end >= today {
            return Ok(closed);
        }
        db.close_period(period.id.context("Open period without id")?, now)?;
        closed += 1;
    }
}
