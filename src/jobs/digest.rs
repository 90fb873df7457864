use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{debug, error};

use super::{JobContext, JobReport};
use crate::budgeting::category_actual;
use crate::db::Database;
use crate::models::User;
use crate::notify::{weekly_digest_email, DigestEntry};

pub(super) fn send_weekly_digests(ctx: &mut JobContext<'_>) -> Result<JobReport> {
    let mut report = JobReport::default();
    for user in ctx.db.get_users()? {
        match digest_for_user(ctx, &user) {
            Ok(sent) => {
                report.processed += 1;
                if sent {
                    report.emails_sent += 1;
                }
            }
            Err(err) => {
                report.failed += 1;
                error!(user_id = user.id, error = %err, "Failed to send weekly digest");
            }
        }
    }
    Ok(report)
}

fn digest_for_user(ctx: &mut JobContext<'_>, user: &User) -> Result<bool> {
    let user_id = user.id.context("User without id")?;
    let Some(pref) = ctx.db.get_preference(user_id)? else {
        debug!(user_id, "No notification preference, skipping digest");
        return Ok(false);
    };
    if !pref.weekly_digest {
        return Ok(false);
    }
    let entries = digest_entries(ctx.db, user_id)?;
    if entries.is_empty() {
        debug!(user_id, "No active budgets, skipping digest");
        return Ok(false);
    }
    ctx.mailer
        .send(&weekly_digest_email(ctx.sender, user, &entries, ctx.today))?;
    Ok(true)
}

/// Standing of each active budget's open period for one user. Budgeted and
/// spent cover expense categories only.
pub(super) fn digest_entries(db: &Database, user_id: i64) -> Result<Vec<DigestEntry>> {
    let mut entries = Vec::new();
    for budget in db.get_budgets(Some(user_id))? {
        let Some(budget_id) = budget.id.filter(|_| budget.is_active) else {
            continue;
        };
        let Some(period) = db.get_open_period(budget_id)? else {
            continue;
        };
        let snapshots = db.get_period_categories(period.id.context("Open period without id")?)?;
        let nets = db.category_net_amounts(user_id, period.period_start, period.period_end)?;

        let expenses = snapshots.iter().filter(|s| !s.is_income);
        let budgeted: Decimal = expenses.clone().map(|s| s.effective_budget).sum();
        let spent: Decimal = expenses
            .map(|s| category_actual(false, nets.get(&s.category_id).copied().unwrap_or_default()))
            .sum();

        entries.push(DigestEntry {
            budget_name: budget.name,
            period_label: period.label(),
            budgeted,
            spent,
            unread_alerts: db.count_unread_alerts(budget_id)?,
        });
    }
    Ok(entries)
}
