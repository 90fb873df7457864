use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::args::*;
use crate::budgeting::{category_actual, month_bounds};
use crate::config::Config;
use crate::db::Database;
use crate::error::BudgetError;
use crate::jobs::{self, Job, JobContext};
use crate::models::*;

pub(crate) fn execute(command: Commands, db: &mut Database, config: &Config) -> Result<()> {
    let today = Local::now().date_naive();
    match command {
        Commands::User(cmd) => cli_user(cmd, db),
        Commands::Account(cmd) => cli_account(cmd, db),
        Commands::Budget(cmd) => cli_budget(cmd, db, today),
        Commands::Txn(cmd) => cli_txn(cmd, db),
        Commands::Import { file, account } => {
            if !file.exists() {
                anyhow::bail!("File not found: {}", file.display());
            }
            let summary = crate::import::import_file(db, &file, account)?;
            println!("Parsed {} transactions", summary.parsed);
            if summary.categories_created > 0 {
                println!("Created {} new categories", summary.categories_created);
            }
            println!(
                "Imported {} new transactions ({} duplicates skipped)",
                summary.inserted, summary.duplicates
            );
            Ok(())
        }
        Commands::Period(cmd) => cli_period(cmd, db),
        Commands::Alerts(cmd) => cli_alerts(cmd, db),
        Commands::Jobs(cmd) => cli_jobs(cmd, db, config, today),
        Commands::Tick => cli_tick(db, config),
    }
}

// ── Users and accounts ───────────────────────────────────────

fn cli_user(cmd: UserCommands, db: &mut Database) -> Result<()> {
    match cmd {
        UserCommands::Add { email, name } => {
            let id = db.insert_user(&User::new(email.clone(), name))?;
            db.upsert_preference(&NotificationPreference::new(id))?;
            println!("Added user {id} <{email}>");
        }
        UserCommands::List => {
            let users = db.get_users()?;
            if users.is_empty() {
                println!("No users");
                return Ok(());
            }
            println!("{:<4} {:<30} Name", "ID", "Email");
            println!("{}", "─".repeat(55));
            for user in &users {
                println!("{:<4} {:<30} {}", user.id.unwrap_or(0), user.email, user.name);
            }
        }
        UserCommands::Prefs {
            user,
            email_alerts,
            weekly_digest,
            warning_pct,
            critical_pct,
        } => {
            if db.get_user(user)?.is_none() {
                return Err(BudgetError::UserNotFound(user).into());
            }
            let mut pref = db
                .get_preference(user)?
                .unwrap_or_else(|| NotificationPreference::new(user));
            let changing = email_alerts.is_some()
                || weekly_digest.is_some()
                || warning_pct.is_some()
                || critical_pct.is_some();
            if let Some(t) = email_alerts {
                pref.email_alerts = t.enabled();
            }
            if let Some(t) = weekly_digest {
                pref.weekly_digest = t.enabled();
            }
            if let Some(pct) = warning_pct {
                pref.warning_pct = pct;
            }
            if let Some(pct) = critical_pct {
                pref.critical_pct = pct;
            }
            if changing {
                db.upsert_preference(&pref)?;
            }

            println!("Preferences for user {user}");
            println!("{}", "─".repeat(30));
            println!("  Email alerts:  {}", on_off(pref.email_alerts));
            println!("  Weekly digest: {}", on_off(pref.weekly_digest));
            println!("  Warning at:    {}%", pref.warning_pct);
            println!("  Critical at:   {}%", pref.critical_pct);
        }
    }
    Ok(())
}

fn cli_account(cmd: AccountCommands, db: &mut Database) -> Result<()> {
    match cmd {
        AccountCommands::Add {
            user,
            name,
            account_type,
        } => {
            let id = db.insert_account(&Account::new(user, name.clone(), account_type))?;
            println!("Added account {id} ({name}, {account_type})");
        }
        AccountCommands::List { user } => {
            let accounts = db.get_accounts_for_user(user)?;
            if accounts.is_empty() {
                println!("No accounts");
                return Ok(());
            }
            println!("{:<4} {:<20} {:<15} Currency", "ID", "Name", "Type");
            println!("{}", "─".repeat(50));
            for acct in &accounts {
                println!(
                    "{:<4} {:<20} {:<15} {}",
                    acct.id.unwrap_or(0),
                    acct.name,
                    acct.account_type.as_str(),
                    acct.currency,
                );
            }
        }
    }
    Ok(())
}

// ── Budgets ──────────────────────────────────────────────────

fn cli_budget(cmd: BudgetCommands, db: &mut Database, today: NaiveDate) -> Result<()> {
    match cmd {
        BudgetCommands::Create {
            user,
            name,
            strategy,
        } => {
            let id = db.create_budget(&Budget::new(user, name.clone(), strategy), &[], today)?;
            println!("Created budget {id} ({name}, {strategy})");
        }
        BudgetCommands::List { user } => {
            let budgets = db.get_budgets(user)?;
            if budgets.is_empty() {
                println!("No budgets");
                return Ok(());
            }
            println!("{:<4} {:<24} {:<6} {:<12} Status", "ID", "Name", "User", "Strategy");
            println!("{}", "─".repeat(60));
            for b in &budgets {
                println!(
                    "{:<4} {:<24} {:<6} {:<12} {}",
                    b.id.unwrap_or(0),
                    b.name,
                    b.user_id,
                    b.strategy.as_str(),
                    if b.is_active { "active" } else { "inactive" },
                );
            }
        }
        BudgetCommands::Show { id } => show_budget(db, id)?,
        BudgetCommands::Rename { id, name } => {
            db.update_budget(id, Some(&name), None)?;
            println!("Renamed budget {id} to {name}");
        }
        BudgetCommands::Deactivate { id } => {
            db.set_budget_active(id, false, today)?;
            println!("Budget {id} deactivated");
        }
        BudgetCommands::Activate { id } => {
            db.set_budget_active(id, true, today)?;
            println!("Budget {id} activated");
        }
        BudgetCommands::SetCategory {
            budget,
            category,
            amount,
            rollover,
            cap,
            income,
            flex_group,
        } => {
            db.require_budget(budget)?;
            let category_id = db.ensure_category(&category)?;
            let existing = find_budget_category(db, budget, category_id)?;
            let updating = existing.is_some();
            let mut bc = existing.unwrap_or_else(|| BudgetCategory::new(budget, category_id, amount));
            bc.amount = amount;
            if let Some(r) = rollover {
                bc.rollover_type = r;
            }
            if cap.is_some() {
                bc.rollover_cap = cap;
            }
            bc.is_income |= income;
            if flex_group.is_some() {
                bc.flex_group = flex_group;
            }

            if updating {
                db.update_budget_category(&bc)?;
                println!("Updated {category} in budget {budget}: ${amount:.2}");
            } else {
                db.add_budget_category(&bc)?;
                println!("Added {category} to budget {budget}: ${amount:.2}");
            }
        }
        BudgetCommands::RemoveCategory { budget, category } => {
            db.require_budget(budget)?;
            let not_found = || BudgetError::CategoryNotFound(category.clone());
            let category_id = db
                .get_category_by_name(&category)?
                .and_then(|c| c.id)
                .ok_or_else(not_found)?;
            let bc = find_budget_category(db, budget, category_id)?.ok_or_else(not_found)?;
            if let Some(bc_id) = bc.id {
                db.remove_budget_category(bc_id)?;
            }
            println!("Removed {category} from budget {budget}");
        }
    }
    Ok(())
}

fn find_budget_category(db: &Database, budget_id: i64, category_id: i64) -> Result<Option<BudgetCategory>> {
    Ok(db
        .get_budget_categories(budget_id)?
        .into_iter()
        .find(|bc| bc.category_id == category_id))
}

fn show_budget(db: &Database, id: i64) -> Result<()> {
    let budget = db.require_budget(id)?;
    println!("{} (#{id})", budget.name);
    println!("{}", "─".repeat(40));
    println!("  Owner:    user {}", budget.user_id);
    println!("  Strategy: {}", budget.strategy);
    println!("  Status:   {}", if budget.is_active { "active" } else { "inactive" });
    match db.get_open_period(id)? {
        Some(p) => println!(
            "  Period:   {} to {} (${:.2} budgeted)",
            p.period_start, p.period_end, p.total_budgeted
        ),
        None => println!("  Period:   none open"),
    }

    let categories = db.get_budget_categories(id)?;
    if categories.is_empty() {
        println!();
        println!("No categories. Add one with: budgetcycle budget set-category {id} <category> <amount>");
        return Ok(());
    }
    println!();
    println!(
        "{:<20} {:>10} {:<8} {:>8} {:<7} Flex group",
        "Category", "Amount", "Rollover", "Cap", "Kind"
    );
    println!("{}", "─".repeat(70));
    for bc in &categories {
        println!(
            "{:<20} {:>10.2} {:<8} {:>8} {:<7} {}",
            bc.category_name,
            bc.amount,
            bc.rollover_type.as_str(),
            bc.rollover_cap.map(|c| format!("{c:.2}")).unwrap_or_else(|| "-".into()),
            if bc.is_income { "income" } else { "expense" },
            bc.flex_group.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

// ── Transactions ─────────────────────────────────────────────

fn cli_txn(cmd: TxnCommands, db: &mut Database) -> Result<()> {
    match cmd {
        TxnCommands::Add {
            account,
            date,
            amount,
            description,
            category,
            transfer,
        } => {
            if db.get_account_by_id(account)?.is_none() {
                return Err(BudgetError::AccountNotFound(account).into());
            }
            let mut txn = Transaction::new(account, date, description, amount);
            txn.is_transfer = transfer;
            if let Some(name) = &category {
                txn.category_id = Some(db.ensure_category(name)?);
            }
            let id = db.insert_transaction(&txn)?;
            let kind = if txn.is_transfer {
                "transfer"
            } else if txn.is_expense() {
                "expense"
            } else {
                "income"
            };
            println!("Recorded {kind} {id}: {date} ${:.2}", txn.abs_amount());
        }
        TxnCommands::List { user, month } => {
            let month = month.unwrap_or_else(|| Local::now().format("%Y-%m").to_string());
            let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
                .with_context(|| format!("Invalid month '{month}', expected YYYY-MM"))?;
            let (start, end) = month_bounds(first);
            let txns = db.get_transactions_for_user(user, start, end)?;
            if txns.is_empty() {
                println!("No transactions for {month}");
                return Ok(());
            }
            println!("{:<5} {:<10} {:<30} {:>10} Account", "ID", "Date", "Description", "Amount");
            println!("{}", "─".repeat(70));
            for t in &txns {
                println!(
                    "{:<5} {:<10} {:<30} {:>10.2} {}{}",
                    t.id.unwrap_or(0),
                    t.date,
                    t.description,
                    t.amount,
                    t.account_id,
                    if t.is_transfer { " (transfer)" } else { "" },
                );
            }
        }
        TxnCommands::Split {
            txn,
            category,
            amount,
        } => {
            let category_id = db.ensure_category(&category)?;
            let id = db.insert_split(&TransactionSplit::new(txn, category_id, amount))?;
            let allocated: Decimal = db.get_splits(txn)?.iter().map(|s| s.amount).sum();
            println!("Added split {id} to transaction {txn}: {category} ${amount:.2}");
            println!("  ${allocated:.2} allocated across splits");
        }
    }
    Ok(())
}

// ── Periods and alerts ───────────────────────────────────────

fn cli_period(cmd: PeriodCommands, db: &mut Database) -> Result<()> {
    match cmd {
        PeriodCommands::Show { budget } => show_open_period(db, budget)?,
        PeriodCommands::History { budget } => {
            db.require_budget(budget)?;
            let periods = db.get_periods(budget)?;
            println!(
                "{:<4} {:<8} {:<7} {:>10} {:>10} {:>10}",
                "ID", "Month", "Status", "Budgeted", "Income", "Expenses"
            );
            println!("{}", "─".repeat(55));
            for p in &periods {
                println!(
                    "{:<4} {:<8} {:<7} {:>10.2} {:>10.2} {:>10.2}",
                    p.id.unwrap_or(0),
                    p.label(),
                    p.status.as_str(),
                    p.total_budgeted,
                    p.actual_income,
                    p.actual_expenses,
                );
            }
        }
        PeriodCommands::Close { budget } => {
            let open = db
                .get_open_period(budget)?
                .ok_or(BudgetError::NoOpenPeriod(budget))?;
            let period_id = open.id.ok_or(BudgetError::NoOpenPeriod(budget))?;
            let outcome = db.close_period(period_id, Utc::now())?;
            println!(
                "Closed {}: income ${:.2}, expenses ${:.2}",
                outcome.closed.label(),
                outcome.closed.actual_income,
                outcome.closed.actual_expenses
            );
            let carried: Decimal = outcome.rollover.values().copied().sum();
            println!(
                "Opened {}: ${:.2} budgeted, ${carried:.2} rolled over",
                outcome.next.label(),
                outcome.next.total_budgeted
            );
        }
    }
    Ok(())
}

fn show_open_period(db: &Database, budget_id: i64) -> Result<()> {
    let budget = db.require_budget(budget_id)?;
    let period = db
        .get_open_period(budget_id)?
        .ok_or(BudgetError::NoOpenPeriod(budget_id))?;
    let period_id = period.id.ok_or(BudgetError::NoOpenPeriod(budget_id))?;
    let nets = db.category_net_amounts(budget.user_id, period.period_start, period.period_end)?;

    println!(
        "{}: {} to {}",
        budget.name, period.period_start, period.period_end
    );
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Category", "Budgeted", "Rollover", "Effective", "Actual", "Left"
    );
    println!("{}", "─".repeat(75));
    for snap in db.get_period_categories(period_id)? {
        let net = nets.get(&snap.category_id).copied().unwrap_or_default();
        let actual = category_actual(snap.is_income, net);
        println!(
            "{:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            snap.category_name,
            snap.budgeted_amount,
            snap.rollover_in,
            snap.effective_budget,
            actual,
            snap.effective_budget - actual,
        );
    }
    println!("{}", "─".repeat(75));
    println!("  Total budgeted: ${:.2}", period.total_budgeted);
    let alerts = db.get_alerts_for_period(budget_id, period.period_start)?;
    let unread = alerts.iter().filter(|a| !a.is_read).count();
    println!("  Alerts:         {} ({unread} unread)", alerts.len());
    Ok(())
}

fn cli_alerts(cmd: AlertCommands, db: &mut Database) -> Result<()> {
    match cmd {
        AlertCommands::List { budget, unread } => {
            db.require_budget(budget)?;
            let alerts = db.get_alerts(budget, unread)?;
            if alerts.is_empty() {
                println!("No alerts");
                return Ok(());
            }
            println!("{:<5} {:<8} {:<8} {:<4} Message", "ID", "Severity", "Month", "New");
            println!("{}", "─".repeat(70));
            for alert in &alerts {
                println!(
                    "{:<5} {:<8} {:<8} {:<4} {}",
                    alert.id.unwrap_or(0),
                    alert.severity.as_str(),
                    alert.period_start.format("%Y-%m"),
                    if alert.is_read { "" } else { "*" },
                    alert.message,
                );
            }
        }
        AlertCommands::Read { id } => {
            if db.mark_alert_read(id)? {
                println!("Alert {id} marked as read");
            } else {
                anyhow::bail!("Alert not found: {id}");
            }
        }
    }
    Ok(())
}

// ── Jobs ─────────────────────────────────────────────────────

fn cli_jobs(cmd: JobCommands, db: &mut Database, config: &Config, today: NaiveDate) -> Result<()> {
    match cmd {
        JobCommands::Run { job } => {
            let mailer = config.mailer()?;
            let mut ctx = JobContext {
                db,
                mailer: mailer.as_ref(),
                default_thresholds: config.thresholds(),
                sender: &config.mail.from,
                today,
                now: Utc::now(),
            };
            let report = jobs::run_job(job, &mut ctx)?;
            println!("{job}: {report}");
        }
        JobCommands::List => {
            println!("{:<15} {:<12} Last run", "Job", "Schedule");
            println!("{}", "─".repeat(55));
            for job in Job::all() {
                let last = db
                    .get_last_job_run(job.name())?
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!("{:<15} {:<12} {last}", job.name(), job.cron_expression());
            }
        }
    }
    Ok(())
}

fn cli_tick(db: &mut Database, config: &Config) -> Result<()> {
    let now = Local::now();
    let mailer = config.mailer()?;
    let mut ctx = JobContext {
        db,
        mailer: mailer.as_ref(),
        default_thresholds: config.thresholds(),
        sender: &config.mail.from,
        today: now.date_naive(),
        now: now.with_timezone(&Utc),
    };
    let ran = jobs::tick(&mut ctx, &now)?;
    if ran.is_empty() {
        println!("No jobs due");
    }
    for (job, report) in &ran {
        println!("{job}: {report}");
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
