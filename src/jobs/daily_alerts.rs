use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, error};

use super::{JobContext, JobReport};
use crate::alerts::{generate_candidates, AlertContext, CategoryUsage, Thresholds, HISTORY_MONTHS};
use crate::budgeting::{category_actual, month_bounds, months_before};
use crate::db::Database;
use crate::error::BudgetError;
use crate::models::{AlertSeverity, Budget, NotificationPreference};
use crate::notify::critical_alerts_email;

pub(super) fn generate_daily_alerts(ctx: &mut JobContext<'_>) -> Result<JobReport> {
    let mut report = JobReport::default();
    for budget in ctx.db.get_active_budgets()? {
        match evaluate_budget(ctx, &budget, &mut report) {
            Ok(()) => report.processed += 1,
            Err(err) => {
                report.failed += 1;
                error!(budget_id = budget.id, error = %err, "Failed to evaluate alerts");
            }
        }
    }
    Ok(report)
}

/// New alerts are counted as soon as they are stored, so a failed send
/// still reports them.
fn evaluate_budget(ctx: &mut JobContext<'_>, budget: &Budget, report: &mut JobReport) -> Result<()> {
    let budget_id = budget.id.context("Budget without id")?;
    let pref = ctx.db.get_preference(budget.user_id)?;
    let thresholds = pref
        .as_ref()
        .map(|p| Thresholds {
            warning_pct: p.warning_pct,
            critical_pct: p.critical_pct,
        })
        .unwrap_or(ctx.default_thresholds);

    let context = build_alert_context(ctx.db, budget, ctx.today, thresholds)?;
    let candidates = generate_candidates(&context);
    debug!(budget_id, candidates = candidates.len(), "Alert rules evaluated");
    let inserted = ctx
        .db
        .insert_alerts_deduped(budget_id, context.period_start, candidates)?;
    report.alerts_created += inserted.len();

    if email_critical(ctx, budget, pref.as_ref(), context.period_start)? {
        report.emails_sent += 1;
    }
    Ok(())
}

/// Gather usage for the calendar month containing `today`. Budgets come
/// from the open period's snapshots so rollover counts.
pub(super) fn build_alert_context(
    db: &Database,
    budget: &Budget,
    today: NaiveDate,
    thresholds: Thresholds,
) -> Result<AlertContext> {
    let budget_id = budget.id.context("Budget without id")?;
    let period = db
        .get_open_period(budget_id)?
        .ok_or(BudgetError::NoOpenPeriod(budget_id))?;
    if !period.contains(today) {
        return Err(BudgetError::PeriodBehind {
            budget_id,
            period_start: period.period_start,
        }
        .into());
    }
    let snapshots = db.get_period_categories(period.id.context("Open period without id")?)?;
    let effective: HashMap<i64, Decimal> = snapshots
        .iter()
        .filter_map(|s| Some((s.budget_category_id?, s.effective_budget)))
        .collect();

    let (start, end) = month_bounds(today);
    let nets = db.category_net_amounts(budget.user_id, start, end)?;
    let history_start = months_before(start, HISTORY_MONTHS as u32);
    let monthly = db.monthly_category_nets(budget.user_id, history_start, start - Duration::days(1))?;
    let labels: Vec<String> = (1..=HISTORY_MONTHS as u32)
        .rev()
        .map(|back| months_before(start, back).format("%Y-%m").to_string())
        .collect();

    let mut categories = Vec::new();
    for bc in db.get_budget_categories(budget_id)? {
        let Some(id) = bc.id else {
            continue;
        };
        let net = nets.get(&bc.category_id).copied().unwrap_or(Decimal::ZERO);
        let history = labels
            .iter()
            .map(|label| {
                let net = monthly
                    .get(&(bc.category_id, label.clone()))
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                category_actual(bc.is_income, net)
            })
            .collect();
        categories.push(CategoryUsage {
            budget_category_id: id,
            name: bc.category_name,
            is_income: bc.is_income,
            flex_group: bc.flex_group,
            effective_budget: effective.get(&id).copied().unwrap_or(bc.amount),
            actual: category_actual(bc.is_income, net),
            history,
        });
    }

    Ok(AlertContext {
        period_start: start,
        period_end: end,
        today,
        thresholds,
        categories,
    })
}

/// Batch every critical alert of the period not yet emailed into one email
/// when the owner wants alert emails. Alerts whose send failed on an earlier
/// run go out with this one.
fn email_critical(
    ctx: &mut JobContext<'_>,
    budget: &Budget,
    pref: Option<&NotificationPreference>,
    period_start: NaiveDate,
) -> Result<bool> {
    let budget_id = budget.id.context("Budget without id")?;
    let critical = ctx.db.get_unemailed_alerts(budget_id, period_start, AlertSeverity::Critical)?;
    if critical.is_empty() {
        return Ok(false);
    }
    if !pref.is_some_and(|p| p.email_alerts) {
        debug!(user_id = budget.user_id, "Alert emails disabled or no preference");
        return Ok(false);
    }
    let Some(user) = ctx.db.get_user(budget.user_id)? else {
        debug!(user_id = budget.user_id, "Budget owner not found, skipping email");
        return Ok(false);
    };

    let email = critical_alerts_email(ctx.sender, &user, budget, &critical);
    ctx.mailer.send(&email)?;
    let ids: Vec<i64> = critical.iter().filter_map(|a| a.id).collect();
    ctx.db.mark_alerts_emailed(&ids)?;
    Ok(true)
}
