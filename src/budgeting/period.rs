use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::BudgetCategory;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PeriodCategoryDraft {
    pub(crate) budget_category_id: i64,
    pub(crate) category_id: i64,
    pub(crate) is_income: bool,
    pub(crate) budgeted_amount: Decimal,
    pub(crate) rollover_in: Decimal,
    pub(crate) effective_budget: Decimal,
}

/// A period ready to be inserted as OPEN.
#[derive(Debug, Clone)]
pub(crate) struct PeriodDraft {
    pub(crate) budget_id: i64,
    pub(crate) period_start: NaiveDate,
    pub(crate) period_end: NaiveDate,
    pub(crate) total_budgeted: Decimal,
    pub(crate) categories: Vec<PeriodCategoryDraft>,
}

/// Snapshot every category of a budget into a new period.
///
/// `rollover_in` is keyed by budget category id; categories without an entry
/// start from zero. Income categories take whatever value the map carries.
/// `total_budgeted` sums the base amounts only, never the rollover.
pub(crate) fn build_period(
    budget_id: i64,
    categories: &[BudgetCategory],
    bounds: (NaiveDate, NaiveDate),
    rollover_in: &HashMap<i64, Decimal>,
) -> PeriodDraft {
    let drafts: Vec<PeriodCategoryDraft> = categories
        .iter()
        .filter_map(|bc| {
            let id = bc.id?;
            let carried = rollover_in.get(&id).copied().unwrap_or(Decimal::ZERO);
            Some(PeriodCategoryDraft {
                budget_category_id: id,
                category_id: bc.category_id,
                is_income: bc.is_income,
                budgeted_amount: bc.amount,
                rollover_in: carried,
                effective_budget: bc.amount + carried,
            })
        })
        .collect();

    PeriodDraft {
        budget_id,
        period_start: bounds.0,
        period_end: bounds.1,
        total_budgeted: categories.iter().map(|bc| bc.amount).sum(),
        categories: drafts,
    }
}

/// First and last day of the calendar month containing `date`.
pub(crate) fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(i64::from(date.day0()));
    let len = days_in_month(start.year(), start.month());
    (start, start + Duration::days(i64::from(len) - 1))
}

/// Bounds of the month that follows a period ending on `period_end`.
pub(crate) fn next_period_bounds(period_end: NaiveDate) -> (NaiveDate, NaiveDate) {
    month_bounds(period_end + Duration::days(1))
}

/// First day of the month `months` months before the month of `date`.
pub(crate) fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    let mut start = month_bounds(date).0;
    for _ in 0..months {
        start = month_bounds(start - Duration::days(1)).0;
    }
    start
}

pub(crate) fn total_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Days of the period that have started by `today`, inclusive of today.
pub(crate) fn days_elapsed(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> i64 {
    ((today - start).num_days() + 1).clamp(0, total_days(start, end))
}

/// Express a signed ledger net in the category's own direction:
/// spend is positive for expense categories, receipts for income ones.
pub(crate) fn category_actual(is_income: bool, net: Decimal) -> Decimal {
    if is_income {
        net
    } else {
        -net
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
