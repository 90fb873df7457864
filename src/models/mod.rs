mod account;
mod alert;
mod budget;
mod category;
mod period;
mod transaction;
mod user;

pub use account::{Account, AccountType};
pub use alert::{AlertCandidate, AlertSeverity, AlertType, BudgetAlert};
pub use budget::{Budget, BudgetCategory, BudgetStrategy, RolloverType};
pub use category::Category;
pub use period::{BudgetPeriod, BudgetPeriodCategory, PeriodStatus};
pub use transaction::{Transaction, TransactionSplit};
pub use user::{NotificationPreference, User};
