use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::BudgetError;
use crate::models::Transaction;

/// `%y` goes before `%Y`: the four-digit form would read "24" as year 24.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];

/// One CSV line: `date, description, amount[, category]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImportRow {
    pub(crate) date: NaiveDate,
    pub(crate) description: String,
    pub(crate) amount: Decimal,
    pub(crate) category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ImportSummary {
    pub(crate) parsed: usize,
    pub(crate) inserted: usize,
    pub(crate) duplicates: usize,
    pub(crate) categories_created: usize,
}

/// Read every record, dropping the first when it looks like a header.
pub(crate) fn read_records(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.context("Failed to read CSV record")?;
        records.push(record.iter().map(|s| s.to_string()).collect());
    }
    if records.is_empty() {
        anyhow::bail!("CSV file is empty");
    }

    if looks_like_header(&records[0]) {
        debug!(header = ?records[0], "Skipping CSV header");
        records.remove(0);
    }
    Ok(records)
}

/// Headers never parse as dates or numbers.
fn looks_like_header(row: &[String]) -> bool {
    row.iter().all(|field| {
        let trimmed = field.trim();
        parse_decimal(trimmed).is_err() && parse_date(trimmed).is_err()
    })
}

/// Parse records into rows. Blank lines are skipped; anything else that fails
/// to parse aborts with the 1-based record number.
pub(crate) fn parse_records(records: &[Vec<String>]) -> Result<Vec<ImportRow>> {
    let mut rows = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let date = parse_date(field(record, 0)).with_context(|| format!("Row {}: bad date", i + 1))?;
        let raw_amount = field(record, 2);
        if raw_amount.is_empty() {
            anyhow::bail!("Row {}: missing amount", i + 1);
        }
        let amount = parse_decimal(raw_amount).with_context(|| format!("Row {}: bad amount", i + 1))?;
        let category = Some(field(record, 3))
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        rows.push(ImportRow {
            date,
            description: field(record, 1).to_string(),
            amount,
            category,
        });
    }
    Ok(rows)
}

fn field(record: &[String], idx: usize) -> &str {
    record.get(idx).map(|s| s.trim()).unwrap_or_default()
}

/// Turn rows into transactions for `account_id`, resolving category names
/// through `resolve`. Identical rows get distinct hashes by occurrence, so a
/// re-import of the same file inserts nothing.
pub(crate) fn to_transactions(
    rows: &[ImportRow],
    account_id: i64,
    mut resolve: impl FnMut(&str) -> Result<i64>,
) -> Result<Vec<Transaction>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut txns = Vec::with_capacity(rows.len());
    for row in rows {
        let key = format!("{}|{}|{}", row.date, row.description, row.amount);
        let occurrence = seen.entry(key).or_default();
        let mut txn = Transaction::new(account_id, row.date, row.description.clone(), row.amount);
        txn.import_hash = compute_hash(account_id, *occurrence, &row.date.to_string(), &row.description, &row.amount);
        *occurrence += 1;
        if let Some(name) = &row.category {
            txn.category_id = Some(resolve(name)?);
        }
        txns.push(txn);
    }
    Ok(txns)
}

/// Import a CSV file into an account, creating categories on demand.
pub(crate) fn import_file(db: &mut Database, path: &Path, account_id: i64) -> Result<ImportSummary> {
    if db.get_account_by_id(account_id)?.is_none() {
        return Err(BudgetError::AccountNotFound(account_id).into());
    }
    let rows = parse_records(&read_records(path)?)?;

    let before = db.get_categories()?.len();
    let txns = to_transactions(&rows, account_id, |name| db.ensure_category(name))?;
    let categories_created = db.get_categories()?.len() - before;

    let inserted = db.insert_transactions_batch(&txns)?;
    let summary = ImportSummary {
        parsed: txns.len(),
        inserted,
        duplicates: txns.len() - inserted,
        categories_created,
    };
    info!(
        account_id,
        parsed = summary.parsed,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "CSV import finished"
    );
    Ok(summary)
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| anyhow::anyhow!("Could not parse date: '{s}'"))
}

/// Accepts `$`, thousands separators and accounting-style `(negatives)`.
pub(crate) fn parse_decimal(s: &str) -> Result<Decimal> {
    let cleaned = s
        .replace(['$', ',', '"'], "")
        .replace('(', "-")
        .replace(')', "")
        .trim()
        .to_string();
    Decimal::from_str(&cleaned).with_context(|| format!("Failed to parse '{s}' as decimal"))
}

/// FNV-1a rather than `DefaultHasher`: the value is persisted, so it must
/// not change between Rust releases.
fn compute_hash(account_id: i64, occurrence: usize, date: &str, description: &str, amount: &Decimal) -> String {
    let input = format!("{account_id}|{occurrence}|{date}|{description}|{amount}");
    format!("{:016x}", fnv1a(input.as_bytes()))
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
#[path = "csv_import_tests.rs"]
mod tests;
