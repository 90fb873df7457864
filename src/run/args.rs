use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::models::{AccountType, BudgetStrategy, RolloverType};

#[derive(Parser, Debug)]
#[command(name = "budgetcycle", version, about = "Budget periods, rollover and spending alerts")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Config file (replaces the one in the platform config directory)
    #[arg(long, global = true, env = "BUDGETCYCLE_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// User and notification preference management
    #[command(subcommand)]
    User(UserCommands),

    /// Account management
    #[command(subcommand)]
    Account(AccountCommands),

    /// Budget and budget category management
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Record transactions
    #[command(subcommand)]
    Txn(TxnCommands),

    /// Import transactions from a CSV file (date, description, amount[, category])
    Import {
        file: PathBuf,
        /// Account ID to import into
        #[arg(long)]
        account: i64,
    },

    /// Budget period inspection and closing
    #[command(subcommand)]
    Period(PeriodCommands),

    /// Budget alerts
    #[command(subcommand)]
    Alerts(AlertCommands),

    /// Run a scheduled job immediately
    #[command(subcommand)]
    Jobs(JobCommands),

    /// Run every job whose schedule fired since its last run
    Tick,
}

#[derive(Subcommand, Debug)]
pub(crate) enum UserCommands {
    /// Add a user
    Add { email: String, name: String },
    /// List users
    List,
    /// Show or change notification preferences
    Prefs {
        user: i64,
        #[arg(long)]
        email_alerts: Option<Toggle>,
        #[arg(long)]
        weekly_digest: Option<Toggle>,
        /// Warning threshold, percent of budget used
        #[arg(long)]
        warning_pct: Option<Decimal>,
        /// Critical threshold, percent of budget used
        #[arg(long)]
        critical_pct: Option<Decimal>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum AccountCommands {
    /// Add an account for a user
    Add {
        user: i64,
        name: String,
        #[arg(long = "type", default_value = "checking", value_parser = parse_account_type)]
        account_type: AccountType,
    },
    /// List a user's accounts
    List { user: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum BudgetCommands {
    /// Create a budget and open its first period
    Create {
        user: i64,
        name: String,
        #[arg(long, default_value = "fixed", value_parser = parse_strategy)]
        strategy: BudgetStrategy,
    },
    /// List budgets
    List {
        /// Only budgets of this user
        #[arg(long)]
        user: Option<i64>,
    },
    /// Show a budget and its categories
    Show { id: i64 },
    /// Rename a budget
    Rename { id: i64, name: String },
    /// Stop processing a budget in scheduled jobs
    Deactivate { id: i64 },
    /// Resume a budget, opening a period if none is open
    Activate { id: i64 },
    /// Add a category to a budget, or update it when already present
    SetCategory {
        budget: i64,
        category: String,
        amount: Decimal,
        #[arg(long, value_parser = parse_rollover)]
        rollover: Option<RolloverType>,
        /// Most that may roll over in one period
        #[arg(long)]
        cap: Option<Decimal>,
        /// Track as expected income rather than spending
        #[arg(long)]
        income: bool,
        #[arg(long)]
        flex_group: Option<String>,
    },
    /// Remove a category from a budget
    RemoveCategory { budget: i64, category: String },
}

#[derive(Subcommand, Debug)]
pub(crate) enum TxnCommands {
    /// Record a transaction. Negative amounts are spending.
    Add {
        account: i64,
        date: NaiveDate,
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
        description: String,
        #[arg(long)]
        category: Option<String>,
        /// Movement between own accounts, never counted in budgets
        #[arg(long)]
        transfer: bool,
    },
    /// List a user's transactions across all accounts
    List {
        user: i64,
        /// Month as YYYY-MM (default: current)
        #[arg(long)]
        month: Option<String>,
    },
    /// Allocate part of a transaction to a category
    Split {
        txn: i64,
        category: String,
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum PeriodCommands {
    /// Show the open period with spending so far
    Show { budget: i64 },
    /// List all periods of a budget
    History { budget: i64 },
    /// Close the open period now and open the next one
    Close { budget: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum AlertCommands {
    /// List a budget's alerts, newest first
    List {
        budget: i64,
        #[arg(long)]
        unread: bool,
    },
    /// Mark an alert as read
    Read { id: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum JobCommands {
    /// Run one job by name
    Run {
        #[arg(value_parser = parse_job)]
        job: crate::jobs::Job,
    },
    /// List jobs with their schedules and last runs
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub(crate) fn enabled(self) -> bool {
        self == Toggle::On
    }
}

fn parse_account_type(s: &str) -> Result<AccountType, String> {
    let parsed = AccountType::parse(s);
    if parsed == AccountType::Other && !s.trim().eq_ignore_ascii_case("other") {
        let names: Vec<&str> = AccountType::all().iter().map(|t| t.as_str()).collect();
        return Err(format!("unknown account type '{s}' ({})", names.join(", ")));
    }
    Ok(parsed)
}

fn parse_strategy(s: &str) -> Result<BudgetStrategy, String> {
    BudgetStrategy::parse(s).ok_or_else(|| format!("unknown strategy '{s}' (fixed, rollover, zero-based)"))
}

fn parse_rollover(s: &str) -> Result<RolloverType, String> {
    RolloverType::parse(s).ok_or_else(|| format!("unknown rollover type '{s}' (none, monthly, annual)"))
}

fn parse_job(s: &str) -> Result<crate::jobs::Job, String> {
    crate::jobs::Job::parse(s).ok_or_else(|| {
        let names: Vec<&str> = crate::jobs::Job::all().iter().map(|j| j.name()).collect();
        format!("unknown job '{s}' ({})", names.join(", "))
    })
}
