//! Rule-based budget alerts.
//!
//! The engine is pure: callers gather an [`AlertContext`] for one budget and
//! one calendar period, [`generate_candidates`] applies every rule, and
//! [`dedup_candidates`] drops whatever the period already recorded.

mod rules;
mod seasonal;

use std::collections::HashSet;

use crate::models::{AlertCandidate, BudgetAlert};

pub(crate) use rules::{generate_candidates, AlertContext, CategoryUsage, Thresholds};
pub(crate) use seasonal::{seasonal_spike, HISTORY_MONTHS};

/// Keep candidates whose (alert type, budget category) pair is not already
/// present in `existing`. Repeats inside `candidates` collapse to the first.
pub(crate) fn dedup_candidates(
    candidates: Vec<AlertCandidate>,
    existing: &[BudgetAlert],
) -> Vec<AlertCandidate> {
    let mut seen: HashSet<_> = existing.iter().map(BudgetAlert::dedup_key).collect();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}
