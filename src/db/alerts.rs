use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

use super::Database;
use crate::alerts::dedup_candidates;
use crate::models::*;

const ALERT_COLUMNS: &str = "id, budget_id, budget_category_id, period_start, alert_type, severity, \
                             message, is_read, emailed, created_at";

impl Database {
    pub(crate) fn get_alerts_for_period(
        &self,
        budget_id: i64,
        period_start: NaiveDate,
    ) -> Result<Vec<BudgetAlert>> {
        query_alerts_for_period(&self.conn, budget_id, period_start)
    }

    /// Store the candidates that are not already recorded for this budget and
    /// period. Returns the alerts actually inserted, with ids.
    pub(crate) fn insert_alerts_deduped(
        &mut self,
        budget_id: i64,
        period_start: NaiveDate,
        candidates: Vec<AlertCandidate>,
    ) -> Result<Vec<BudgetAlert>> {
        let tx = self.conn.transaction()?;
        let existing = query_alerts_for_period(&tx, budget_id, period_start)?;
        let mut inserted = Vec::new();
        for candidate in dedup_candidates(candidates, &existing) {
            let mut alert = candidate.into_alert(budget_id, period_start);
            tx.execute(
                "INSERT INTO budget_alerts
                    (budget_id, budget_category_id, period_start, alert_type, severity, message, is_read, emailed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)",
                params![
                    alert.budget_id,
                    alert.budget_category_id,
                    alert.period_start,
                    alert.alert_type.as_str(),
                    alert.severity.as_str(),
                    alert.message,
                    alert.created_at,
                ],
            )?;
            alert.id = Some(tx.last_insert_rowid());
            inserted.push(alert);
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Alerts of a budget, newest first.
    pub(crate) fn get_alerts(&self, budget_id: i64, unread_only: bool) -> Result<Vec<BudgetAlert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM budget_alerts
             WHERE budget_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![budget_id, unread_only], alert_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Alerts of one severity in a budget period that were never emailed, oldest first.
    pub(crate) fn get_unemailed_alerts(
        &self,
        budget_id: i64,
        period_start: NaiveDate,
        severity: AlertSeverity,
    ) -> Result<Vec<BudgetAlert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM budget_alerts
             WHERE budget_id = ?1 AND period_start = ?2 AND severity = ?3 AND emailed = 0
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![budget_id, period_start, severity.as_str()],
            alert_from_row,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Returns false when no such alert exists.
    pub(crate) fn mark_alert_read(&self, alert_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE budget_alerts SET is_read = 1 WHERE id = ?1",
            params![alert_id],
        )?;
        Ok(changed > 0)
    }

    pub(crate) fn mark_alerts_emailed(&mut self, alert_ids: &[i64]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for id in alert_ids {
            tx.execute(
                "UPDATE budget_alerts SET emailed = 1 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn count_unread_alerts(&self, budget_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM budget_alerts WHERE budget_id = ?1 AND is_read = 0",
            params![budget_id],
            |row| row.get(0),
        )?)
    }
}

fn query_alerts_for_period(
    conn: &Connection,
    budget_id: i64,
    period_start: NaiveDate,
) -> Result<Vec<BudgetAlert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM budget_alerts
         WHERE budget_id = ?1 AND period_start = ?2
         ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![budget_id, period_start], alert_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<BudgetAlert> {
    let raw_type: String = row.get(4)?;
    let alert_type = AlertType::parse(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown alert type {raw_type}").into(),
        )
    })?;
    Ok(BudgetAlert {
        id: Some(row.get(0)?),
        budget_id: row.get(1)?,
        budget_category_id: row.get(2)?,
        period_start: row.get(3)?,
        alert_type,
        severity: AlertSeverity::parse(&row.get::<_, String>(5)?),
        message: row.get(6)?,
        is_read: row.get(7)?,
        emailed: row.get(8)?,
        created_at: row.get(9)?,
    })
}
