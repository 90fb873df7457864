use chrono::NaiveDate;
use rust_decimal::Decimal;

/// A ledger entry. Negative amounts are money out, positive amounts money in.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Option<i64>,
    pub account_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub category_id: Option<i64>,
    pub is_transfer: bool,
    pub import_hash: String,
    pub created_at: String,
}

impl Transaction {
    pub fn new(account_id: i64, date: NaiveDate, description: String, amount: Decimal) -> Self {
        Self {
            id: None,
            account_id,
            date,
            description,
            amount,
            category_id: None,
            is_transfer: false,
            import_hash: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_income(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }
}

/// Part of a transaction allocated to a category. Once a transaction has
/// splits, only the splits count toward category actuals.
#[derive(Debug, Clone)]
pub struct TransactionSplit {
    pub id: Option<i64>,
    pub transaction_id: i64,
    pub category_id: i64,
    pub amount: Decimal,
}

impl TransactionSplit {
    pub fn new(transaction_id: i64, category_id: i64, amount: Decimal) -> Self {
        Self {
            id: None,
            transaction_id,
            category_id,
            amount,
        }
    }
}
