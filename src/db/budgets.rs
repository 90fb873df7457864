use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

use super::periods::{insert_period, query_open_period};
use super::{decimal_at, optional_decimal_at, Database};
use crate::budgeting::{build_period, month_bounds};
use crate::error::{ensure_non_negative, BudgetError};
use crate::models::*;

const BUDGET_COLUMNS: &str = "id, user_id, name, strategy, is_active, created_at";

impl Database {
    /// Create a budget with its categories and open its first period for the
    /// month containing `today`, all in one transaction.
    pub(crate) fn create_budget(
        &mut self,
        budget: &Budget,
        categories: &[BudgetCategory],
        today: NaiveDate,
    ) -> Result<i64> {
        if self.get_user(budget.user_id)?.is_none() {
            return Err(BudgetError::UserNotFound(budget.user_id).into());
        }
        for bc in categories {
            validate_category(bc)?;
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO budgets (user_id, name, strategy, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                budget.user_id,
                budget.name,
                budget.strategy.as_str(),
                budget.is_active,
                budget.created_at,
            ],
        )?;
        let budget_id = tx.last_insert_rowid();

        for bc in categories {
            insert_budget_category_row(&tx, budget_id, bc)?;
        }

        let stored = query_budget_categories(&tx, budget_id)?;
        let draft = build_period(budget_id, &stored, month_bounds(today), &HashMap::new());
        insert_period(&tx, &draft)?;
        tx.commit().context("Failed to commit new budget")?;

        info!(budget_id, name = %budget.name, categories = categories.len(), "Budget created");
        Ok(budget_id)
    }

    pub(crate) fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?1"),
                params![id],
                budget_from_row,
            )
            .optional()?)
    }

    /// Like [`Database::get_budget`] but a missing budget is an error.
    pub(crate) fn require_budget(&self, id: i64) -> Result<Budget> {
        self.get_budget(id)?
            .ok_or_else(|| BudgetError::BudgetNotFound(id).into())
    }

    pub(crate) fn get_budgets(&self, user_id: Option<i64>) -> Result<Vec<Budget>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets
             WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id], budget_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_active_budgets(&self) -> Result<Vec<Budget>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets WHERE is_active = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], budget_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn update_budget(
        &self,
        id: i64,
        name: Option<&str>,
        strategy: Option<BudgetStrategy>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE budgets SET name = COALESCE(?1, name), strategy = COALESCE(?2, strategy)
             WHERE id = ?3",
            params![name, strategy.map(|s| s.as_str()), id],
        )?;
        if changed == 0 {
            return Err(BudgetError::BudgetNotFound(id).into());
        }
        Ok(())
    }

    /// Deactivate or reactivate a budget. Reactivation opens a period for the
    /// month containing `today` when the budget has none open.
    pub(crate) fn set_budget_active(&mut self, id: i64, active: bool, today: NaiveDate) -> Result<()> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE budgets SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(BudgetError::BudgetNotFound(id).into());
        }
        if active && query_open_period(&tx, id)?.is_none() {
            let categories = query_budget_categories(&tx, id)?;
            let draft = build_period(id, &categories, month_bounds(today), &HashMap::new());
            insert_period(&tx, &draft)?;
            debug!(budget_id = id, "Opened period on reactivation");
        }
        tx.commit()?;
        info!(budget_id = id, active, "Budget activity changed");
        Ok(())
    }

    // ── Budget categories ─────────────────────────────────────

    pub(crate) fn get_budget_categories(&self, budget_id: i64) -> Result<Vec<BudgetCategory>> {
        query_budget_categories(&self.conn, budget_id)
    }

    /// Add a category to a budget. The open period, if any, gets a snapshot
    /// with no rollover and its `total_budgeted` grows by the amount.
    pub(crate) fn add_budget_category(&mut self, bc: &BudgetCategory) -> Result<i64> {
        validate_category(bc)?;
        let tx = self.conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM budget_categories WHERE budget_id = ?1 AND category_id = ?2)",
            params![bc.budget_id, bc.category_id],
            |row| row.get(0),
        )?;
        if exists {
            let name: String = tx
                .query_row(
                    "SELECT name FROM categories WHERE id = ?1",
                    params![bc.category_id],
                    |row| row.get(0),
                )
                .unwrap_or_else(|_| bc.category_id.to_string());
            return Err(BudgetError::DuplicateCategory(name).into());
        }

        let id = insert_budget_category_row(&tx, bc.budget_id, bc)?;

        if let Some(period) = query_open_period(&tx, bc.budget_id)? {
            let period_id = period.id.context("Open period without id")?;
            tx.execute(
                "INSERT INTO budget_period_categories
                    (period_id, budget_category_id, category_id, is_income, budgeted_amount, rollover_in, effective_budget)
                 VALUES (?1, ?2, ?3, ?4, ?5, '0', ?5)",
                params![period_id, id, bc.category_id, bc.is_income, bc.amount.to_string()],
            )?;
            set_total_budgeted(&tx, period_id, period.total_budgeted + bc.amount)?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Update a category's allocation and rollover settings. The open
    /// period's snapshot follows the new amount and keeps its rollover in.
    pub(crate) fn update_budget_category(&mut self, bc: &BudgetCategory) -> Result<()> {
        validate_category(bc)?;
        let id = bc.id.context("Budget category has no id")?;
        let tx = self.conn.transaction()?;

        let (budget_id, old_amount): (i64, Decimal) = tx
            .query_row(
                "SELECT budget_id, amount FROM budget_categories WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, decimal_at(row, 1)?)),
            )
            .optional()?
            .ok_or_else(|| BudgetError::CategoryNotFound(id.to_string()))?;

        tx.execute(
            "UPDATE budget_categories
             SET amount = ?1, rollover_type = ?2, rollover_cap = ?3, is_income = ?4, flex_group = ?5
             WHERE id = ?6",
            params![
                bc.amount.to_string(),
                bc.rollover_type.as_str(),
                bc.rollover_cap.map(|c| c.to_string()),
                bc.is_income,
                bc.flex_group,
                id,
            ],
        )?;

        if let Some(period) = query_open_period(&tx, budget_id)? {
            let period_id = period.id.context("Open period without id")?;
            let snapshot: Option<(i64, Decimal)> = tx
                .query_row(
                    "SELECT id, rollover_in FROM budget_period_categories
                     WHERE period_id = ?1 AND budget_category_id = ?2",
                    params![period_id, id],
                    |row| Ok((row.get(0)?, decimal_at(row, 1)?)),
                )
                .optional()?;
            if let Some((snapshot_id, rollover_in)) = snapshot {
                tx.execute(
                    "UPDATE budget_period_categories
                     SET budgeted_amount = ?1, effective_budget = ?2, is_income = ?3
                     WHERE id = ?4",
                    params![
                        bc.amount.to_string(),
                        (bc.amount + rollover_in).to_string(),
                        bc.is_income,
                        snapshot_id,
                    ],
                )?;
                set_total_budgeted(&tx, period_id, period.total_budgeted - old_amount + bc.amount)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove a category from a budget. Its open-period snapshot goes with
    /// it; closed snapshots stay for history with the link cleared.
    pub(crate) fn remove_budget_category(&mut self, budget_category_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let (budget_id, amount): (i64, Decimal) = tx
            .query_row(
                "SELECT budget_id, amount FROM budget_categories WHERE id = ?1",
                params![budget_category_id],
                |row| Ok((row.get(0)?, decimal_at(row, 1)?)),
            )
            .optional()?
            .ok_or_else(|| BudgetError::CategoryNotFound(budget_category_id.to_string()))?;

        if let Some(period) = query_open_period(&tx, budget_id)? {
            let period_id = period.id.context("Open period without id")?;
            let removed = tx.execute(
                "DELETE FROM budget_period_categories WHERE period_id = ?1 AND budget_category_id = ?2",
                params![period_id, budget_category_id],
            )?;
            if removed > 0 {
                set_total_budgeted(&tx, period_id, period.total_budgeted - amount)?;
            }
        }

        tx.execute(
            "DELETE FROM budget_categories WHERE id = ?1",
            params![budget_category_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn validate_category(bc: &BudgetCategory) -> Result<(), BudgetError> {
    ensure_non_negative(bc.amount)?;
    if let Some(cap) = bc.rollover_cap {
        ensure_non_negative(cap)?;
    }
    Ok(())
}

fn insert_budget_category_row(conn: &Connection, budget_id: i64, bc: &BudgetCategory) -> Result<i64> {
    conn.execute(
        "INSERT INTO budget_categories
            (budget_id, category_id, amount, rollover_type, rollover_cap, is_income, flex_group)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            budget_id,
            bc.category_id,
            bc.amount.to_string(),
            bc.rollover_type.as_str(),
            bc.rollover_cap.map(|c| c.to_string()),
            bc.is_income,
            bc.flex_group,
        ],
    )
    .with_context(|| format!("Failed to add category {} to budget {budget_id}", bc.category_id))?;
    Ok(conn.last_insert_rowid())
}

fn set_total_budgeted(conn: &Connection, period_id: i64, total: Decimal) -> Result<()> {
    conn.execute(
        "UPDATE budget_periods SET total_budgeted = ?1 WHERE id = ?2",
        params![total.to_string(), period_id],
    )?;
    Ok(())
}

pub(super) fn query_budget_categories(conn: &Connection, budget_id: i64) -> Result<Vec<BudgetCategory>> {
    let mut stmt = conn.prepare(
        "SELECT bc.id, bc.budget_id, bc.category_id, c.name, bc.amount, bc.rollover_type,
                bc.rollover_cap, bc.is_income, bc.flex_group
         FROM budget_categories bc JOIN categories c ON c.id = bc.category_id
         WHERE bc.budget_id = ?1
         ORDER BY bc.id",
    )?;
    let rows = stmt.query_map(params![budget_id], |row| {
        Ok(BudgetCategory {
            id: Some(row.get(0)?),
            budget_id: row.get(1)?,
            category_id: row.get(2)?,
            category_name: row.get(3)?,
            amount: decimal_at(row, 4)?,
            rollover_type: RolloverType::parse(&row.get::<_, String>(5)?).unwrap_or_default(),
            rollover_cap: optional_decimal_at(row, 6)?,
            is_income: row.get(7)?,
            flex_group: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        name: row.get(2)?,
        strategy: BudgetStrategy::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}
