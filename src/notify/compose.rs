use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Write;

use super::Email;
use crate::models::{Budget, BudgetAlert, User};

/// One budget line of the weekly digest.
#[derive(Debug, Clone)]
pub(crate) struct DigestEntry {
    pub(crate) budget_name: String,
    pub(crate) period_label: String,
    pub(crate) budgeted: Decimal,
    pub(crate) spent: Decimal,
    pub(crate) unread_alerts: i64,
}

impl DigestEntry {
    pub(crate) fn percent_used(&self) -> Option<Decimal> {
        (self.budgeted > Decimal::ZERO)
            .then(|| (self.spent / self.budgeted * Decimal::ONE_HUNDRED).round_dp(0))
    }
}

/// All critical alerts raised for one budget in a run, batched into one message.
pub(crate) fn critical_alerts_email(
    from: &str,
    user: &User,
    budget: &Budget,
    alerts: &[BudgetAlert],
) -> Email {
    let plural = if alerts.len() == 1 { "" } else { "s" };
    let mut body = format!(
        "Hi {},\n\n{} critical alert{plural} for \"{}\":\n\n",
        user.name,
        alerts.len(),
        budget.name
    );
    for alert in alerts {
        let _ = writeln!(body, "  - {}", alert.message);
    }
    let _ = write!(
        body,
        "\nReview them with: budgetcycle alerts list {}",
        budget.id.unwrap_or_default()
    );

    Email {
        from: from.to_string(),
        to: user.email.clone(),
        subject: format!(
            "[BudgetCycle] {} critical alert{plural} for {}",
            alerts.len(),
            budget.name
        ),
        body,
    }
}

pub(crate) fn weekly_digest_email(
    from: &str,
    user: &User,
    entries: &[DigestEntry],
    week_of: NaiveDate,
) -> Email {
    let mut body = format!("Hi {},\n\nHere is where your budgets stand:\n\n", user.name);
    for entry in entries {
        let used = entry
            .percent_used()
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "n/a".into());
        let _ = writeln!(
            body,
            "  {} ({}): ${:.2} of ${:.2} spent, {} used, {} unread alert{}",
            entry.budget_name,
            entry.period_label,
            entry.spent,
            entry.budgeted,
            used,
            entry.unread_alerts,
            if entry.unread_alerts == 1 { "" } else { "s" }
        );
    }

    Email {
        from: from.to_string(),
        to: user.email.clone(),
        subject: format!("[BudgetCycle] Weekly digest for {}", week_of.format("%b %-d, %Y")),
        body,
    }
}
