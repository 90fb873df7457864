use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

use super::budgets::query_budget_categories;
use super::{decimal_at, net_amounts_by_category, optional_decimal_at, Database};
use crate::budgeting::{
    build_period, category_actual, compute_rollover, month_bounds, next_period_bounds, PeriodDraft,
};
use crate::error::BudgetError;
use crate::models::*;

const PERIOD_COLUMNS: &str = "id, budget_id, period_start, period_end, status, total_budgeted, \
                              actual_income, actual_expenses, closed_at";

/// Result of closing a period: the closed period, its successor, and the
/// rollover each budget category carried across.
#[derive(Debug, Clone)]
pub(crate) struct CloseOutcome {
    pub(crate) closed: BudgetPeriod,
    pub(crate) next: BudgetPeriod,
    pub(crate) rollover: HashMap<i64, Decimal>,
}

impl Database {
    pub(crate) fn get_open_period(&self, budget_id: i64) -> Result<Option<BudgetPeriod>> {
        query_open_period(&self.conn, budget_id)
    }

    /// All periods of a budget, most recent first.
    pub(crate) fn get_periods(&self, budget_id: i64) -> Result<Vec<BudgetPeriod>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERIOD_COLUMNS} FROM budget_periods WHERE budget_id = ?1
             ORDER BY period_start DESC"
        ))?;
        let rows = stmt.query_map(params![budget_id], period_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_period_categories(&self, period_id: i64) -> Result<Vec<BudgetPeriodCategory>> {
        query_period_categories(&self.conn, period_id)
    }

    /// Open a period for the month containing `today` from the budget's
    /// current categories. Fails when the budget already has an open period.
    pub(crate) fn open_period(&mut self, budget_id: i64, today: NaiveDate) -> Result<BudgetPeriod> {
        let budget = self.require_budget(budget_id)?;
        if !budget.is_active {
            return Err(BudgetError::BudgetInactive(budget_id).into());
        }

        let tx = self.conn.transaction()?;
        if let Some(existing) = query_open_period(&tx, budget_id)? {
            return Err(BudgetError::OpenPeriodExists {
                budget_id,
                period_id: existing.id.unwrap_or_default(),
            }
            .into());
        }
        let categories = query_budget_categories(&tx, budget_id)?;
        let draft = build_period(budget_id, &categories, month_bounds(today), &HashMap::new());
        let period_id = insert_period(&tx, &draft)?;
        let period = query_period(&tx, period_id)?.context("Inserted period vanished")?;
        tx.commit()?;
        Ok(period)
    }

    /// Close an open period and open the next one in a single transaction.
    ///
    /// Actuals are the direct and split amounts of every linked account of the
    /// budget owner within the period bounds, transfers excluded. Each
    /// snapshot's rollover out becomes the next period's rollover in.
    pub(crate) fn close_period(&mut self, period_id: i64, closed_at: DateTime<Utc>) -> Result<CloseOutcome> {
        let tx = self.conn.transaction()?;

        let period = query_period(&tx, period_id)?.ok_or(BudgetError::PeriodNotFound(period_id))?;
        if !period.is_open() {
            return Err(BudgetError::PeriodNotOpen(period_id).into());
        }
        let user_id: i64 = tx.query_row(
            "SELECT user_id FROM budgets WHERE id = ?1",
            params![period.budget_id],
            |row| row.get(0),
        )?;

        let nets = net_amounts_by_category(&tx, user_id, period.period_start, period.period_end)?;
        let categories = query_budget_categories(&tx, period.budget_id)?;
        let settings: HashMap<i64, (RolloverType, Option<Decimal>)> = categories
            .iter()
            .filter_map(|bc| Some((bc.id?, (bc.rollover_type, bc.rollover_cap))))
            .collect();

        let mut rollover = HashMap::new();
        let mut income = Decimal::ZERO;
        let mut expenses = Decimal::ZERO;
        for snap in query_period_categories(&tx, period_id)? {
            let net = nets.get(&snap.category_id).copied().unwrap_or(Decimal::ZERO);
            let actual = category_actual(snap.is_income, net);
            let (rollover_type, cap) = snap
                .budget_category_id
                .and_then(|id| settings.get(&id))
                .copied()
                .unwrap_or((RolloverType::None, None));
            let out = compute_rollover(rollover_type, cap, snap.effective_budget, actual);

            if snap.is_income {
                income += actual;
            } else {
                expenses += actual;
            }
            tx.execute(
                "UPDATE budget_period_categories SET actual_amount = ?1, rollover_out = ?2 WHERE id = ?3",
                params![actual.to_string(), out.to_string(), snap.id],
            )?;
            if let Some(bc_id) = snap.budget_category_id {
                rollover.insert(bc_id, out);
            }
        }

        tx.execute(
            "UPDATE budget_periods
             SET status = ?1, actual_income = ?2, actual_expenses = ?3, closed_at = ?4
             WHERE id = ?5",
            params![
                PeriodStatus::Closed.as_str(),
                income.to_string(),
                expenses.to_string(),
                closed_at.to_rfc3339(),
                period_id,
            ],
        )?;

        let draft = build_period(
            period.budget_id,
            &categories,
            next_period_bounds(period.period_end),
            &rollover,
        );
        let next_id = insert_period(&tx, &draft)?;

        let closed = query_period(&tx, period_id)?.context("Closed period vanished")?;
        let next = query_period(&tx, next_id)?.context("Next period vanished")?;
        tx.commit().context("Failed to commit period close")?;

        info!(
            budget_id = period.budget_id,
            period_id,
            next_period_id = next_id,
            %income,
            %expenses,
            "Closed budget period {}",
            closed.label()
        );
        Ok(CloseOutcome {
            closed,
            next,
            rollover,
        })
    }
}

/// Insert an OPEN period and its category snapshots. Returns the period id.
pub(super) fn insert_period(conn: &Connection, draft: &PeriodDraft) -> Result<i64> {
    conn.execute(
        "INSERT INTO budget_periods (budget_id, period_start, period_end, status, total_budgeted)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            draft.budget_id,
            draft.period_start,
            draft.period_end,
            PeriodStatus::Open.as_str(),
            draft.total_budgeted.to_string(),
        ],
    )
    .with_context(|| {
        format!(
            "Failed to open period {} for budget {}",
            draft.period_start, draft.budget_id
        )
    })?;
    let period_id = conn.last_insert_rowid();

    for c in &draft.categories {
        conn.execute(
            "INSERT INTO budget_period_categories
                (period_id, budget_category_id, category_id, is_income, budgeted_amount, rollover_in, effective_budget)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                period_id,
                c.budget_category_id,
                c.category_id,
                c.is_income,
                c.budgeted_amount.to_string(),
                c.rollover_in.to_string(),
                c.effective_budget.to_string(),
            ],
        )?;
    }
    Ok(period_id)
}

pub(super) fn query_open_period(conn: &Connection, budget_id: i64) -> Result<Option<BudgetPeriod>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PERIOD_COLUMNS} FROM budget_periods WHERE budget_id = ?1 AND status = 'OPEN'"),
            params![budget_id],
            period_from_row,
        )
        .optional()?)
}

fn query_period(conn: &Connection, period_id: i64) -> Result<Option<BudgetPeriod>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PERIOD_COLUMNS} FROM budget_periods WHERE id = ?1"),
            params![period_id],
            period_from_row,
        )
        .optional()?)
}

fn query_period_categories(conn: &Connection, period_id: i64) -> Result<Vec<BudgetPeriodCategory>> {
    let mut stmt = conn.prepare(
        "SELECT pc.id, pc.period_id, pc.budget_category_id, pc.category_id, c.name, pc.is_income,
                pc.budgeted_amount, pc.rollover_in, pc.effective_budget, pc.actual_amount, pc.rollover_out
         FROM budget_period_categories pc JOIN categories c ON c.id = pc.category_id
         WHERE pc.period_id = ?1
         ORDER BY pc.id",
    )?;
    let rows = stmt.query_map(params![period_id], |row| {
        Ok(BudgetPeriodCategory {
            id: Some(row.get(0)?),
            period_id: row.get(1)?,
            budget_category_id: row.get(2)?,
            category_id: row.get(3)?,
            category_name: row.get(4)?,
            is_income: row.get(5)?,
            budgeted_amount: decimal_at(row, 6)?,
            rollover_in: decimal_at(row, 7)?,
            effective_budget: decimal_at(row, 8)?,
            actual_amount: optional_decimal_at(row, 9)?,
            rollover_out: optional_decimal_at(row, 10)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn period_from_row(row: &Row<'_>) -> rusqlite::Result<BudgetPeriod> {
    Ok(BudgetPeriod {
        id: Some(row.get(0)?),
        budget_id: row.get(1)?,
        period_start: row.get(2)?,
        period_end: row.get(3)?,
        status: PeriodStatus::parse(&row.get::<_, String>(4)?),
        total_budgeted: decimal_at(row, 5)?,
        actual_income: decimal_at(row, 6)?,
        actual_expenses: decimal_at(row, 7)?,
        closed_at: row.get(8)?,
    })
}

#[cfg(test)]
#[path = "periods_tests.rs"]
mod tests;
