use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    ThresholdWarning,
    ThresholdCritical,
    OverBudget,
    ProjectedOverspend,
    FlexGroupWarning,
    IncomeShortfall,
    PositiveMilestone,
    SeasonalSpike,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdWarning => "THRESHOLD_WARNING",
            Self::ThresholdCritical => "THRESHOLD_CRITICAL",
            Self::OverBudget => "OVER_BUDGET",
            Self::ProjectedOverspend => "PROJECTED_OVERSPEND",
            Self::FlexGroupWarning => "FLEX_GROUP_WARNING",
            Self::IncomeShortfall => "INCOME_SHORTFALL",
            Self::PositiveMilestone => "POSITIVE_MILESTONE",
            Self::SeasonalSpike => "SEASONAL_SPIKE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == s)
    }

    pub fn all() -> &'static [AlertType] {
        &[
            Self::ThresholdWarning,
            Self::ThresholdCritical,
            Self::OverBudget,
            Self::ProjectedOverspend,
            Self::FlexGroupWarning,
            Self::IncomeShortfall,
            Self::PositiveMilestone,
            Self::SeasonalSpike,
        ]
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CRITICAL" => Self::Critical,
            "WARNING" => Self::Warning,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored alert. Unique per (budget, period_start, alert_type, budget_category_id).
#[derive(Debug, Clone)]
pub struct BudgetAlert {
    pub id: Option<i64>,
    pub budget_id: i64,
    pub budget_category_id: Option<i64>,
    pub period_start: NaiveDate,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub is_read: bool,
    pub emailed: bool,
    pub created_at: String,
}

impl BudgetAlert {
    pub fn dedup_key(&self) -> (AlertType, Option<i64>) {
        (self.alert_type, self.budget_category_id)
    }
}

/// An alert the engine would like to raise, before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub budget_category_id: Option<i64>,
    pub message: String,
}

impl AlertCandidate {
    pub fn dedup_key(&self) -> (AlertType, Option<i64>) {
        (self.alert_type, self.budget_category_id)
    }

    pub fn into_alert(self, budget_id: i64, period_start: NaiveDate) -> BudgetAlert {
        BudgetAlert {
            id: None,
            budget_id,
            budget_category_id: self.budget_category_id,
            period_start,
            alert_type: self.alert_type,
            severity: self.severity,
            message: self.message,
            is_read: false,
            emailed: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
