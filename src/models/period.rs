use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("CLOSED") {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One calendar month of a budget. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct BudgetPeriod {
    pub id: Option<i64>,
    pub budget_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: PeriodStatus,
    pub total_budgeted: Decimal,
    pub actual_income: Decimal,
    pub actual_expenses: Decimal,
    pub closed_at: Option<String>,
}

impl BudgetPeriod {
    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.period_start <= date && date <= self.period_end
    }

    /// "YYYY-MM" label of the month the period covers.
    pub fn label(&self) -> String {
        self.period_start.format("%Y-%m").to_string()
    }
}

/// Snapshot of a budget category for one period.
#[derive(Debug, Clone)]
pub struct BudgetPeriodCategory {
    pub id: Option<i64>,
    pub period_id: i64,
    /// `None` once the budget category has been removed from the budget.
    pub budget_category_id: Option<i64>,
    pub category_id: i64,
    pub category_name: String,
    pub is_income: bool,
    pub budgeted_amount: Decimal,
    pub rollover_in: Decimal,
    pub effective_budget: Decimal,
    pub actual_amount: Option<Decimal>,
    pub rollover_out: Option<Decimal>,
}
