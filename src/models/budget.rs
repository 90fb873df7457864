use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetStrategy {
    #[default]
    Fixed,
    Rollover,
    ZeroBased,
}

impl BudgetStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Rollover => "ROLLOVER",
            Self::ZeroBased => "ZERO_BASED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "FIXED" => Some(Self::Fixed),
            "ROLLOVER" => Some(Self::Rollover),
            "ZERO_BASED" | "ZEROBASED" => Some(Self::ZeroBased),
            _ => None,
        }
    }
}

impl std::fmt::Display for BudgetStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolloverType {
    #[default]
    None,
    Monthly,
    Annual,
}

impl RolloverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Monthly => "MONTHLY",
            Self::Annual => "ANNUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "MONTHLY" => Some(Self::Monthly),
            "ANNUAL" | "YEARLY" => Some(Self::Annual),
            _ => None,
        }
    }
}

impl std::fmt::Display for RolloverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Budget {
    pub id: Option<i64>,
    pub user_id: i64,
    pub name: String,
    pub strategy: BudgetStrategy,
    pub is_active: bool,
    pub created_at: String,
}

impl Budget {
    pub fn new(user_id: i64, name: String, strategy: BudgetStrategy) -> Self {
        Self {
            id: None,
            user_id,
            name,
            strategy,
            is_active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One category allocation of a budget.
#[derive(Debug, Clone)]
pub struct BudgetCategory {
    pub id: Option<i64>,
    pub budget_id: i64,
    pub category_id: i64,
    /// Filled from `categories.name` on reads; ignored on writes.
    pub category_name: String,
    pub amount: Decimal,
    pub rollover_type: RolloverType,
    pub rollover_cap: Option<Decimal>,
    pub is_income: bool,
    pub flex_group: Option<String>,
}

impl BudgetCategory {
    pub fn new(budget_id: i64, category_id: i64, amount: Decimal) -> Self {
        Self {
            id: None,
            budget_id,
            category_id,
            category_name: String::new(),
            amount,
            rollover_type: RolloverType::None,
            rollover_cap: None,
            is_income: false,
            flex_group: None,
        }
    }
}
