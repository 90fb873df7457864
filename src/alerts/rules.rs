use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::seasonal_spike;
use crate::budgeting::{days_elapsed, total_days};
use crate::models::{AlertCandidate, AlertSeverity, AlertType};

/// Projected spend above this share of the budget raises a velocity alert.
const PROJECTION_LIMIT: Decimal = Decimal::from_parts(110, 0, 0, false, 2);
/// Combined usage of a flex group at or above this share raises an alert.
const FLEX_GROUP_LIMIT: Decimal = Decimal::from_parts(90, 0, 0, false, 2);
/// Income below this share of the prorated expectation is a shortfall.
const INCOME_FLOOR: Decimal = Decimal::from_parts(80, 0, 0, false, 2);
/// Overall usage below this percentage past mid-period is worth celebrating.
const MILESTONE_PCT: Decimal = Decimal::from_parts(60, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Thresholds {
    pub(crate) warning_pct: Decimal,
    pub(crate) critical_pct: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_pct: Decimal::from(75),
            critical_pct: Decimal::from(90),
        }
    }
}

/// Usage of one budget category in the period being evaluated.
#[derive(Debug, Clone)]
pub(crate) struct CategoryUsage {
    pub(crate) budget_category_id: i64,
    pub(crate) name: String,
    pub(crate) is_income: bool,
    pub(crate) flex_group: Option<String>,
    pub(crate) effective_budget: Decimal,
    /// Spend for expense categories, receipts for income ones.
    pub(crate) actual: Decimal,
    /// Monthly actuals for the 12 months before the period, oldest first.
    pub(crate) history: Vec<Decimal>,
}

#[derive(Debug, Clone)]
pub(crate) struct AlertContext {
    pub(crate) period_start: NaiveDate,
    pub(crate) period_end: NaiveDate,
    pub(crate) today: NaiveDate,
    pub(crate) thresholds: Thresholds,
    pub(crate) categories: Vec<CategoryUsage>,
}

impl AlertContext {
    fn total_days(&self) -> i64 {
        total_days(self.period_start, self.period_end)
    }

    fn days_elapsed(&self) -> i64 {
        days_elapsed(self.period_start, self.period_end, self.today)
    }

    fn past_midpoint(&self) -> bool {
        self.days_elapsed() * 2 > self.total_days()
    }

    fn expenses(&self) -> impl Iterator<Item = &CategoryUsage> {
        self.categories.iter().filter(|c| !c.is_income)
    }

    fn income(&self) -> impl Iterator<Item = &CategoryUsage> {
        self.categories.iter().filter(|c| c.is_income)
    }
}

/// Run every rule over one budget's period. Candidates are not deduplicated.
pub(crate) fn generate_candidates(ctx: &AlertContext) -> Vec<AlertCandidate> {
    let mut out = Vec::new();
    for usage in ctx.expenses() {
        out.extend(threshold_alert(usage, &ctx.thresholds));
        out.extend(projected_overspend(usage, ctx.days_elapsed(), ctx.total_days()));
        out.extend(seasonal_alert(usage));
    }
    out.extend(flex_group_alerts(ctx));
    out.extend(income_shortfall(ctx));
    out.extend(positive_milestone(ctx));
    out
}

fn percent_of(actual: Decimal, budget: Decimal) -> Decimal {
    actual / budget * Decimal::ONE_HUNDRED
}

fn threshold_alert(usage: &CategoryUsage, thresholds: &Thresholds) -> Option<AlertCandidate> {
    if usage.effective_budget <= Decimal::ZERO {
        return None;
    }
    let pct = percent_of(usage.actual, usage.effective_budget);
    let (alert_type, severity, message) = if pct >= Decimal::ONE_HUNDRED {
        (
            AlertType::OverBudget,
            AlertSeverity::Critical,
            format!(
                "{} is over budget: ${:.2} spent of ${:.2} ({}%)",
                usage.name,
                usage.actual,
                usage.effective_budget,
                pct.round_dp(0)
            ),
        )
    } else if pct >= thresholds.critical_pct {
        (
            AlertType::ThresholdCritical,
            AlertSeverity::Critical,
            format!(
                "{} has used {}% of its ${:.2} budget",
                usage.name,
                pct.round_dp(0),
                usage.effective_budget
            ),
        )
    } else if pct >= thresholds.warning_pct {
        (
            AlertType::ThresholdWarning,
            AlertSeverity::Warning,
            format!(
                "{} has used {}% of its ${:.2} budget",
                usage.name,
                pct.round_dp(0),
                usage.effective_budget
            ),
        )
    } else {
        return None;
    };

    Some(AlertCandidate {
        alert_type,
        severity,
        budget_category_id: Some(usage.budget_category_id),
        message,
    })
}

/// Linear extrapolation of the spend so far over the whole period.
fn projected_overspend(usage: &CategoryUsage, elapsed: i64, total: i64) -> Option<AlertCandidate> {
    if elapsed <= 0 || usage.effective_budget <= Decimal::ZERO {
        return None;
    }
    if usage.actual >= usage.effective_budget {
        return None;
    }
    let daily_rate = usage.actual / Decimal::from(elapsed);
    let projected = daily_rate * Decimal::from(total);
    if projected <= usage.effective_budget * PROJECTION_LIMIT {
        return None;
    }
    Some(AlertCandidate {
        alert_type: AlertType::ProjectedOverspend,
        severity: AlertSeverity::Warning,
        budget_category_id: Some(usage.budget_category_id),
        message: format!(
            "{} is on pace to spend ${:.2} against a ${:.2} budget",
            usage.name, projected, usage.effective_budget
        ),
    })
}

fn seasonal_alert(usage: &CategoryUsage) -> Option<AlertCandidate> {
    let spike = seasonal_spike(&usage.history)?;
    Some(AlertCandidate {
        alert_type: AlertType::SeasonalSpike,
        severity: AlertSeverity::Info,
        budget_category_id: Some(usage.budget_category_id),
        message: format!(
            "{} usually spikes next month: ${:.2} last year vs a ${:.2} monthly average",
            usage.name, spike.upcoming, spike.mean
        ),
    })
}

/// One alert per flex group, keyed to the group's lowest budget category id.
fn flex_group_alerts(ctx: &AlertContext) -> Vec<AlertCandidate> {
    let mut groups: BTreeMap<&str, Vec<&CategoryUsage>> = BTreeMap::new();
    for usage in ctx.expenses() {
        if let Some(group) = usage.flex_group.as_deref().filter(|g| !g.trim().is_empty()) {
            groups.entry(group).or_default().push(usage);
        }
    }

    groups
        .into_iter()
        .filter_map(|(group, members)| {
            let budget: Decimal = members.iter().map(|u| u.effective_budget).sum();
            let spent: Decimal = members.iter().map(|u| u.actual).sum();
            if budget <= Decimal::ZERO || spent < budget * FLEX_GROUP_LIMIT {
                return None;
            }
            let anchor = members.iter().map(|u| u.budget_category_id).min()?;
            Some(AlertCandidate {
                alert_type: AlertType::FlexGroupWarning,
                severity: AlertSeverity::Warning,
                budget_category_id: Some(anchor),
                message: format!(
                    "Flex group '{group}' has used {}% of its combined ${:.2}",
                    percent_of(spent, budget).round_dp(0),
                    budget
                ),
            })
        })
        .collect()
}

fn income_shortfall(ctx: &AlertContext) -> Option<AlertCandidate> {
    if !ctx.past_midpoint() {
        return None;
    }
    let expected: Decimal = ctx.income().map(|u| u.effective_budget).sum();
    if expected <= Decimal::ZERO {
        return None;
    }
    let prorated = expected * Decimal::from(ctx.days_elapsed()) / Decimal::from(ctx.total_days());
    let received: Decimal = ctx.income().map(|u| u.actual).sum();
    if received >= prorated * INCOME_FLOOR {
        return None;
    }
    Some(AlertCandidate {
        alert_type: AlertType::IncomeShortfall,
        severity: AlertSeverity::Warning,
        budget_category_id: None,
        message: format!(
            "Income so far is ${:.2}, below the ${:.2} expected by this point",
            received, prorated
        ),
    })
}

fn positive_milestone(ctx: &AlertContext) -> Option<AlertCandidate> {
    if !ctx.past_midpoint() {
        return None;
    }
    let budget: Decimal = ctx
        .expenses()
        .map(|u| u.effective_budget)
        .filter(|b| *b > Decimal::ZERO)
        .sum();
    if budget <= Decimal::ZERO {
        return None;
    }
    let spent: Decimal = ctx
        .expenses()
        .filter(|u| u.effective_budget > Decimal::ZERO)
        .map(|u| u.actual)
        .sum();
    let pct = percent_of(spent, budget);
    if pct >= MILESTONE_PCT {
        return None;
    }
    Some(AlertCandidate {
        alert_type: AlertType::PositiveMilestone,
        severity: AlertSeverity::Info,
        budget_category_id: None,
        message: format!(
            "Past the halfway mark with only {}% of the budget used",
            pct.round_dp(0)
        ),
    })
}
