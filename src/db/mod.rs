mod alerts;
mod budgets;
mod periods;
mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::BudgetError;
use crate::models::*;

pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        let mut db = Self { conn };
        db.migrate().context("Database migration failed")?;
        db.seed_default_categories()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        db.seed_default_categories()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&mut self) -> Result<()> {
        let has_version_table: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !has_version_table {
            // Fresh database - apply full schema
            self.conn.execute_batch(schema::SCHEMA_V1)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::CURRENT_VERSION],
            )?;
            return Ok(());
        }

        let current: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        for &(from_version, sql) in schema::MIGRATIONS {
            if current <= from_version {
                self.conn.execute_batch(sql)?;
            }
        }

        if current < schema::CURRENT_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::CURRENT_VERSION],
            )?;
        }

        Ok(())
    }

    fn seed_default_categories(&mut self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let defaults = [
            "Dining Out",
            "Entertainment",
            "Freelance",
            "Gifts",
            "Groceries",
            "Health",
            "Insurance",
            "Rent/Mortgage",
            "Salary",
            "Shopping",
            "Subscriptions",
            "Transportation",
            "Travel",
            "Uncategorized",
            "Utilities",
        ];

        let tx = self.conn.transaction()?;
        for name in &defaults {
            tx.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                params![name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────

    pub(crate) fn insert_user(&self, user: &User) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO users (email, name, created_at) VALUES (?1, ?2, ?3)",
                params![user.email, user.name, user.created_at],
            )
            .with_context(|| format!("Failed to add user {}", user.email))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?)
    }

    pub(crate) fn get_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, name, created_at FROM users ORDER BY id")?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn upsert_preference(&self, pref: &NotificationPreference) -> Result<()> {
        crate::error::ensure_thresholds(pref.warning_pct, pref.critical_pct)?;
        self.conn.execute(
            "INSERT INTO notification_preferences (user_id, email_alerts, weekly_digest, warning_pct, critical_pct)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                email_alerts = ?2, weekly_digest = ?3, warning_pct = ?4, critical_pct = ?5",
            params![
                pref.user_id,
                pref.email_alerts,
                pref.weekly_digest,
                pref.warning_pct.to_string(),
                pref.critical_pct.to_string(),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_preference(&self, user_id: i64) -> Result<Option<NotificationPreference>> {
        Ok(self
            .conn
            .query_row(
                "SELECT user_id, email_alerts, weekly_digest, warning_pct, critical_pct
                 FROM notification_preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(NotificationPreference {
                        user_id: row.get(0)?,
                        email_alerts: row.get(1)?,
                        weekly_digest: row.get(2)?,
                        warning_pct: decimal_at(row, 3)?,
                        critical_pct: decimal_at(row, 4)?,
                    })
                },
            )
            .optional()?)
    }

    // ── Accounts ──────────────────────────────────────────────

    pub(crate) fn insert_account(&self, account: &Account) -> Result<i64> {
        if self.get_user(account.user_id)?.is_none() {
            return Err(BudgetError::UserNotFound(account.user_id).into());
        }
        self.conn.execute(
            "INSERT INTO accounts (user_id, name, account_type, currency, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account.user_id,
                account.name,
                account.account_type.as_str(),
                account.currency,
                account.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn get_accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, account_type, currency, created_at
             FROM accounts WHERE user_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![user_id], account_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_account_by_id(&self, id: i64) -> Result<Option<Account>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, name, account_type, currency, created_at
                 FROM accounts WHERE id = ?1",
                params![id],
                account_from_row,
            )
            .optional()?)
    }

    // ── Categories ────────────────────────────────────────────

    pub(crate) fn get_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Category {
                id: Some(row.get(0)?),
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM categories WHERE name = ?1",
                params![Category::normalize_name(name)],
                |row| {
                    Ok(Category {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub(crate) fn insert_category(&self, cat: &Category) -> Result<i64> {
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", params![cat.name])
            .with_context(|| format!("Failed to add category {}", cat.name))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Look a category up by name, creating it when missing.
    pub(crate) fn ensure_category(&self, name: &str) -> Result<i64> {
        if let Some(id) = self.get_category_by_name(name)?.and_then(|c| c.id) {
            return Ok(id);
        }
        self.insert_category(&Category::new(name))
    }

    // ── Transactions ──────────────────────────────────────────

    pub(crate) fn insert_transaction(&self, txn: &Transaction) -> Result<i64> {
        insert_transaction_row(&self.conn, txn)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a batch in one transaction, skipping rows whose import hash is
    /// already stored. Returns the number inserted.
    pub(crate) fn insert_transactions_batch(&mut self, txns: &[Transaction]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;
        for txn in txns {
            if !txn.import_hash.is_empty() {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM transactions WHERE import_hash = ?1)",
                    params![txn.import_hash],
                    |row| row.get(0),
                )?;
                if exists {
                    continue;
                }
            }
            insert_transaction_row(&tx, txn)?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    pub(crate) fn insert_split(&self, split: &TransactionSplit) -> Result<i64> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE id = ?1)",
            params![split.transaction_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(BudgetError::TransactionNotFound(split.transaction_id).into());
        }
        self.conn.execute(
            "INSERT INTO transaction_splits (transaction_id, category_id, amount) VALUES (?1, ?2, ?3)",
            params![split.transaction_id, split.category_id, split.amount.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn get_splits(&self, transaction_id: i64) -> Result<Vec<TransactionSplit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, transaction_id, category_id, amount
             FROM transaction_splits WHERE transaction_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![transaction_id], |row| {
            Ok(TransactionSplit {
                id: Some(row.get(0)?),
                transaction_id: row.get(1)?,
                category_id: row.get(2)?,
                amount: decimal_at(row, 3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Transactions across every account of a user, newest first.
    pub(crate) fn get_transactions_for_user(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.account_id, t.date, t.description, t.amount, t.category_id,
                    t.is_transfer, t.import_hash, t.created_at
             FROM transactions t JOIN accounts a ON a.id = t.account_id
             WHERE a.user_id = ?1 AND t.date BETWEEN ?2 AND ?3
             ORDER BY t.date DESC, t.id DESC",
        )?;
        let rows = stmt.query_map(params![user_id, start, end], |row| {
            Ok(Transaction {
                id: Some(row.get(0)?),
                account_id: row.get(1)?,
                date: row.get(2)?,
                description: row.get(3)?,
                amount: decimal_at(row, 4)?,
                category_id: row.get(5)?,
                is_transfer: row.get(6)?,
                import_hash: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ── Aggregation ───────────────────────────────────────────

    /// Signed net per category within `[start, end]` across all of a user's accounts.
    pub(crate) fn category_net_amounts(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<i64, Decimal>> {
        net_amounts_by_category(&self.conn, user_id, start, end)
    }

    /// Signed net per (category, "YYYY-MM") within `[start, end]`.
    pub(crate) fn monthly_category_nets(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<(i64, String), Decimal>> {
        let mut totals: HashMap<(i64, String), Decimal> = HashMap::new();
        for (category_id, date, amount) in ledger_rows(&self.conn, user_id, start, end)? {
            *totals
                .entry((category_id, date.format("%Y-%m").to_string()))
                .or_default() += amount;
        }
        Ok(totals)
    }

    // ── Job runs ──────────────────────────────────────────────

    pub(crate) fn get_last_job_run(&self, job: &str) -> Result<Option<DateTime<FixedOffset>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT last_run_at FROM job_runs WHERE job = ?1",
                params![job],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("Invalid last run timestamp for {job}: {s}"))
        })
        .transpose()
    }

    pub(crate) fn record_job_run<Tz: TimeZone>(&self, job: &str, at: &DateTime<Tz>) -> Result<()>
    where
        Tz::Offset: std::fmt::Display,
    {
        self.conn.execute(
            "INSERT INTO job_runs (job, last_run_at) VALUES (?1, ?2)
             ON CONFLICT(job) DO UPDATE SET last_run_at = ?2",
            params![job, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

// ── Row helpers ───────────────────────────────────────────────

/// Read a TEXT column holding a decimal.
pub(super) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(super) fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type: AccountType::parse(&row.get::<_, String>(3)?),
        currency: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn insert_transaction_row(conn: &Connection, txn: &Transaction) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions (account_id, date, description, amount, category_id, is_transfer, import_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            txn.account_id,
            txn.date,
            txn.description,
            txn.amount.to_string(),
            txn.category_id,
            txn.is_transfer,
            txn.import_hash,
            txn.created_at,
        ],
    )?;
    Ok(())
}

/// Every categorized ledger movement of a user within `[start, end]`:
/// unsplit transactions by their own category plus split rows by theirs.
/// Transfers never count.
fn ledger_rows(
    conn: &Connection,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(i64, NaiveDate, Decimal)>> {
    let mut stmt = conn.prepare(
        "SELECT t.category_id, t.date, t.amount
         FROM transactions t JOIN accounts a ON a.id = t.account_id
         WHERE a.user_id = ?1 AND t.date BETWEEN ?2 AND ?3
           AND t.is_transfer = 0 AND t.category_id IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM transaction_splits s WHERE s.transaction_id = t.id)
         UNION ALL
         SELECT s.category_id, t.date, s.amount
         FROM transaction_splits s
         JOIN transactions t ON t.id = s.transaction_id
         JOIN accounts a ON a.id = t.account_id
         WHERE a.user_id = ?1 AND t.date BETWEEN ?2 AND ?3 AND t.is_transfer = 0",
    )?;
    let rows = stmt.query_map(params![user_id, start, end], |row| {
        Ok((row.get(0)?, row.get(1)?, decimal_at(row, 2)?))
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub(super) fn net_amounts_by_category(
    conn: &Connection,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<HashMap<i64, Decimal>> {
    let mut totals: HashMap<i64, Decimal> = HashMap::new();
    for (category_id, _, amount) in ledger_rows(conn, user_id, start, end)? {
        *totals.entry(category_id).or_default() += amount;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests;
