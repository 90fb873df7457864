use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Domain failures surfaced by budget and period operations.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum BudgetError {
    #[error("Budget not found: {0}")]
    BudgetNotFound(i64),

    #[error("Budget {0} is inactive")]
    BudgetInactive(i64),

    #[error("Budget period not found: {0}")]
    PeriodNotFound(i64),

    #[error("Budget period {0} is already closed")]
    PeriodNotOpen(i64),

    #[error("Budget {0} has no open period")]
    NoOpenPeriod(i64),

    #[error("Budget {budget_id} open period starting {period_start} is behind today; close it first")]
    PeriodBehind { budget_id: i64, period_start: NaiveDate },

    #[error("Budget {budget_id} already has an open period ({period_id})")]
    OpenPeriodExists { budget_id: i64, period_id: i64 },

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Category '{0}' is already part of this budget")]
    DuplicateCategory(String),

    #[error("Invalid amount {0}: must not be negative")]
    NegativeAmount(Decimal),

    #[error("Invalid thresholds: warning {warning}% must be above 0 and below critical {critical}% (max 100)")]
    InvalidThresholds { warning: Decimal, critical: Decimal },
}

/// Reject negative allocations and caps.
pub(crate) fn ensure_non_negative(amount: Decimal) -> Result<Decimal, BudgetError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BudgetError::NegativeAmount(amount));
    }
    Ok(amount)
}

pub(crate) fn ensure_thresholds(warning: Decimal, critical: Decimal) -> Result<(), BudgetError> {
    if warning <= Decimal::ZERO || warning >= critical || critical > Decimal::ONE_HUNDRED {
        return Err(BudgetError::InvalidThresholds { warning, critical });
    }
    Ok(())
}
