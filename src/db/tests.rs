#![allow(clippy::unwrap_used)]

use super::*;
use crate::models::{AlertCandidate, AlertSeverity, AlertType};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A user with one checking account. Returns (user_id, account_id).
fn seed_user(db: &Database, email: &str) -> (i64, i64) {
    let user_id = db
        .insert_user(&User::new(email.into(), "Test User".into()))
        .unwrap();
    let account_id = db
        .insert_account(&Account::new(user_id, "Checking".into(), AccountType::Checking))
        .unwrap();
    (user_id, account_id)
}

fn category_id(db: &Database, name: &str) -> i64 {
    db.get_category_by_name(name).unwrap().unwrap().id.unwrap()
}

fn txn(account_id: i64, day: NaiveDate, amount: Decimal, category: Option<i64>) -> Transaction {
    let mut t = Transaction::new(account_id, day, "Test".into(), amount);
    t.category_id = category;
    t
}

fn budget_error(err: &anyhow::Error) -> Option<&BudgetError> {
    err.downcast_ref::<BudgetError>()
}

// ── Default data ──────────────────────────────────────────────

#[test]
fn test_default_categories_seeded() {
    let db = Database::open_in_memory().unwrap();
    let cats = db.get_categories().unwrap();
    assert_eq!(cats.len(), 15);
    assert!(cats.iter().any(|c| c.name == "Salary"));
    assert!(cats.iter().any(|c| c.name == "Uncategorized"));
}

#[test]
fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget.db");
    {
        let db = Database::open(&path).unwrap();
        db.insert_user(&User::new("a@b.c".into(), "A".into())).unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_users().unwrap().len(), 1);
    assert_eq!(db.get_categories().unwrap().len(), 15);
}

// ── Users and preferences ─────────────────────────────────────

#[test]
fn test_user_crud() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_user(&User::new("sam@example.com".into(), "Sam".into()))
        .unwrap();
    let user = db.get_user(id).unwrap().unwrap();
    assert_eq!(user.email, "sam@example.com");
    assert!(db.get_user(999).unwrap().is_none());
}

#[test]
fn test_duplicate_email_rejected() {
    let db = Database::open_in_memory().unwrap();
    db.insert_user(&User::new("x@y.z".into(), "One".into())).unwrap();
    assert!(db.insert_user(&User::new("x@y.z".into(), "Two".into())).is_err());
}

#[test]
fn test_preference_upsert() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, _) = seed_user(&db, "p@q.r");
    assert!(db.get_preference(user_id).unwrap().is_none());

    let mut pref = NotificationPreference::new(user_id);
    db.upsert_preference(&pref).unwrap();
    pref.email_alerts = false;
    pref.warning_pct = dec!(60);
    db.upsert_preference(&pref).unwrap();

    let stored = db.get_preference(user_id).unwrap().unwrap();
    assert!(!stored.email_alerts);
    assert!(stored.weekly_digest);
    assert_eq!(stored.warning_pct, dec!(60));
    assert_eq!(stored.critical_pct, dec!(90));
}

#[test]
fn test_preference_invalid_thresholds() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, _) = seed_user(&db, "p@q.r");
    let mut pref = NotificationPreference::new(user_id);
    pref.warning_pct = dec!(95);
    let err = db.upsert_preference(&pref).unwrap_err();
    assert!(matches!(
        budget_error(&err),
        Some(BudgetError::InvalidThresholds { .. })
    ));
}

// ── Accounts ──────────────────────────────────────────────────

#[test]
fn test_account_crud() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, account_id) = seed_user(&db, "a@b.c");
    db.insert_account(&Account::new(user_id, "Visa".into(), AccountType::CreditCard))
        .unwrap();

    let fetched = db.get_account_by_id(account_id).unwrap().unwrap();
    assert_eq!(fetched.name, "Checking");
    assert_eq!(fetched.account_type, AccountType::Checking);

    let all = db.get_accounts_for_user(user_id).unwrap();
    assert_eq!(all.len(), 2);
    assert!(db.get_account_by_id(99999).unwrap().is_none());
}

#[test]
fn test_account_requires_user() {
    let db = Database::open_in_memory().unwrap();
    let err = db
        .insert_account(&Account::new(42, "Orphan".into(), AccountType::Cash))
        .unwrap_err();
    assert_eq!(budget_error(&err), Some(&BudgetError::UserNotFound(42)));
}

// ── Categories ────────────────────────────────────────────────

#[test]
fn test_category_lookup_case_insensitive() {
    let db = Database::open_in_memory().unwrap();
    let by_lower = db.get_category_by_name("groceries").unwrap().unwrap();
    assert_eq!(by_lower.name, "Groceries");
}

#[test]
fn test_ensure_category_creates_once() {
    let db = Database::open_in_memory().unwrap();
    let first = db.ensure_category("Pets").unwrap();
    let second = db.ensure_category("pets").unwrap();
    assert_eq!(first, second);
    assert_eq!(db.get_categories().unwrap().len(), 16);
}

// ── Transactions ──────────────────────────────────────────────

#[test]
fn test_batch_insert_skips_known_hashes() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, account_id) = seed_user(&db, "a@b.c");

    let mut a = txn(account_id, date(2024, 3, 2), dec!(-10), None);
    a.import_hash = "h1".into();
    let mut b = txn(account_id, date(2024, 3, 3), dec!(-20), None);
    b.import_hash = "h2".into();

    assert_eq!(db.insert_transactions_batch(&[a.clone(), b.clone()]).unwrap(), 2);
    assert_eq!(db.insert_transactions_batch(&[a, b]).unwrap(), 0);
}

#[test]
fn test_transactions_for_user_in_range() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, account_id) = seed_user(&db, "a@b.c");
    let (_, other_account) = seed_user(&db, "other@b.c");

    db.insert_transaction(&txn(account_id, date(2024, 3, 1), dec!(-5), None)).unwrap();
    db.insert_transaction(&txn(account_id, date(2024, 3, 31), dec!(-6), None)).unwrap();
    db.insert_transaction(&txn(account_id, date(2024, 4, 1), dec!(-7), None)).unwrap();
    db.insert_transaction(&txn(other_account, date(2024, 3, 10), dec!(-8), None)).unwrap();

    let rows = db
        .get_transactions_for_user(user_id, date(2024, 3, 1), date(2024, 3, 31))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, date(2024, 3, 31));
    assert_eq!(rows[0].amount, dec!(-6));
}

#[test]
fn test_split_requires_transaction() {
    let db = Database::open_in_memory().unwrap();
    let groceries = category_id(&db, "Groceries");
    let err = db
        .insert_split(&TransactionSplit::new(77, groceries, dec!(-10)))
        .unwrap_err();
    assert_eq!(budget_error(&err), Some(&BudgetError::TransactionNotFound(77)));
}

// ── Aggregation ───────────────────────────────────────────────

#[test]
fn test_net_amounts_rules() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, checking) = seed_user(&db, "a@b.c");
    let savings = db
        .insert_account(&Account::new(user_id, "Savings".into(), AccountType::Savings))
        .unwrap();
    let (_, stranger) = seed_user(&db, "z@b.c");
    let groceries = category_id(&db, "Groceries");
    let dining = category_id(&db, "Dining Out");
    let salary = category_id(&db, "Salary");

    // Direct spend across two linked accounts, plus a refund.
    db.insert_transaction(&txn(checking, date(2024, 3, 5), dec!(-100), Some(groceries))).unwrap();
    db.insert_transaction(&txn(savings, date(2024, 3, 6), dec!(-50), Some(groceries))).unwrap();
    db.insert_transaction(&txn(checking, date(2024, 3, 7), dec!(20), Some(groceries))).unwrap();
    db.insert_transaction(&txn(checking, date(2024, 3, 15), dec!(3000), Some(salary))).unwrap();

    // Transfers never count.
    let mut transfer = txn(checking, date(2024, 3, 8), dec!(-500), Some(groceries));
    transfer.is_transfer = true;
    db.insert_transaction(&transfer).unwrap();

    // A split parent counts only through its splits.
    let parent = db
        .insert_transaction(&txn(checking, date(2024, 3, 9), dec!(-90), Some(groceries)))
        .unwrap();
    db.insert_split(&TransactionSplit::new(parent, groceries, dec!(-60))).unwrap();
    db.insert_split(&TransactionSplit::new(parent, dining, dec!(-30))).unwrap();

    // Other users and out-of-range dates are ignored.
    db.insert_transaction(&txn(stranger, date(2024, 3, 5), dec!(-999), Some(groceries))).unwrap();
    db.insert_transaction(&txn(checking, date(2024, 4, 1), dec!(-999), Some(groceries))).unwrap();

    let nets = db
        .category_net_amounts(user_id, date(2024, 3, 1), date(2024, 3, 31))
        .unwrap();
    assert_eq!(nets[&groceries], dec!(-190));
    assert_eq!(nets[&dining], dec!(-30));
    assert_eq!(nets[&salary], dec!(3000));
    assert_eq!(db.get_splits(parent).unwrap().len(), 2);
}

#[test]
fn test_monthly_category_nets() {
    let db = Database::open_in_memory().unwrap();
    let (user_id, account_id) = seed_user(&db, "a@b.c");
    let gifts = category_id(&db, "Gifts");
    db.insert_transaction(&txn(account_id, date(2023, 12, 3), dec!(-200), Some(gifts))).unwrap();
    db.insert_transaction(&txn(account_id, date(2023, 12, 20), dec!(-100), Some(gifts))).unwrap();
    db.insert_transaction(&txn(account_id, date(2024, 1, 4), dec!(-10), Some(gifts))).unwrap();

    let monthly = db
        .monthly_category_nets(user_id, date(2023, 12, 1), date(2024, 1, 31))
        .unwrap();
    assert_eq!(monthly[&(gifts, "2023-12".to_string())], dec!(-300));
    assert_eq!(monthly[&(gifts, "2024-01".to_string())], dec!(-10));
}

// ── Job runs ──────────────────────────────────────────────────

#[test]
fn test_job_run_roundtrip() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.get_last_job_run("daily-alerts").unwrap().is_none());

    let first = Utc::now();
    db.record_job_run("daily-alerts", &first).unwrap();
    let later = first + chrono::Duration::hours(1);
    db.record_job_run("daily-alerts", &later).unwrap();

    let stored = db.get_last_job_run("daily-alerts").unwrap().unwrap();
    assert_eq!(stored.timestamp(), later.timestamp());
}

// ── Budgets ───────────────────────────────────────────────────

fn seed_budget(db: &mut Database) -> (i64, i64) {
    let (user_id, _) = seed_user(db, "owner@b.c");
    let groceries = category_id(db, "Groceries");
    let salary = category_id(db, "Salary");
    let mut income = BudgetCategory::new(0, salary, dec!(3000));
    income.is_income = true;
    let budget_id = db
        .create_budget(
            &Budget::new(user_id, "Household".into(), BudgetStrategy::Rollover),
            &[BudgetCategory::new(0, groceries, dec!(400)), income],
            date(2024, 3, 14),
        )
        .unwrap();
    (user_id, budget_id)
}

#[test]
fn test_create_budget_opens_first_period() {
    let mut db = Database::open_in_memory().unwrap();
    let (user_id, budget_id) = seed_budget(&mut db);

    let budget = db.require_budget(budget_id).unwrap();
    assert_eq!(budget.name, "Household");
    assert_eq!(budget.strategy, BudgetStrategy::Rollover);
    assert!(budget.is_active);
    assert_eq!(db.get_budgets(Some(user_id)).unwrap().len(), 1);
    assert_eq!(db.get_budgets(None).unwrap().len(), 1);

    let period = db.get_open_period(budget_id).unwrap().unwrap();
    assert_eq!(period.period_start, date(2024, 3, 1));
    assert_eq!(period.period_end, date(2024, 3, 31));
    assert_eq!(period.total_budgeted, dec!(3400));

    let snaps = db.get_period_categories(period.id.unwrap()).unwrap();
    assert_eq!(snaps.len(), 2);
    assert!(snaps.iter().all(|s| s.rollover_in == Decimal::ZERO));
    assert!(snaps.iter().any(|s| s.is_income && s.category_name == "Salary"));
}

#[test]
fn test_create_budget_rejects_negative_amount() {
    let mut db = Database::open_in_memory().unwrap();
    let (user_id, _) = seed_user(&db, "a@b.c");
    let groceries = category_id(&db, "Groceries");
    let err = db
        .create_budget(
            &Budget::new(user_id, "Bad".into(), BudgetStrategy::Fixed),
            &[BudgetCategory::new(0, groceries, dec!(-1))],
            date(2024, 3, 1),
        )
        .unwrap_err();
    assert_eq!(budget_error(&err), Some(&BudgetError::NegativeAmount(dec!(-1))));
    assert!(db.get_budgets(None).unwrap().is_empty());
}

#[test]
fn test_create_budget_unknown_user() {
    let mut db = Database::open_in_memory().unwrap();
    let err = db
        .create_budget(
            &Budget::new(5, "Nobody".into(), BudgetStrategy::Fixed),
            &[],
            date(2024, 3, 1),
        )
        .unwrap_err();
    assert_eq!(budget_error(&err), Some(&BudgetError::UserNotFound(5)));
}

#[test]
fn test_update_budget() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    db.update_budget(budget_id, Some("Home"), None).unwrap();
    db.update_budget(budget_id, None, Some(BudgetStrategy::ZeroBased)).unwrap();
    let budget = db.require_budget(budget_id).unwrap();
    assert_eq!(budget.name, "Home");
    assert_eq!(budget.strategy, BudgetStrategy::ZeroBased);

    let err = db.update_budget(404, Some("x"), None).unwrap_err();
    assert_eq!(budget_error(&err), Some(&BudgetError::BudgetNotFound(404)));
}

#[test]
fn test_deactivate_and_reactivate() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);

    db.set_budget_active(budget_id, false, date(2024, 3, 20)).unwrap();
    assert!(db.get_active_budgets().unwrap().is_empty());
    // The open period survives deactivation, so reactivating opens nothing new.
    db.set_budget_active(budget_id, true, date(2024, 3, 21)).unwrap();
    assert_eq!(db.get_active_budgets().unwrap().len(), 1);
    assert_eq!(db.get_periods(budget_id).unwrap().len(), 1);
}

#[test]
fn test_add_category_updates_open_period() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let dining = category_id(&db, "Dining Out");

    let mut bc = BudgetCategory::new(budget_id, dining, dec!(150));
    bc.flex_group = Some("Fun".into());
    let bc_id = db.add_budget_category(&bc).unwrap();

    let period = db.get_open_period(budget_id).unwrap().unwrap();
    assert_eq!(period.total_budgeted, dec!(3550));
    let snap = db
        .get_period_categories(period.id.unwrap())
        .unwrap()
        .into_iter()
        .find(|s| s.budget_category_id == Some(bc_id))
        .unwrap();
    assert_eq!(snap.effective_budget, dec!(150));

    let stored = db.get_budget_categories(budget_id).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].flex_group.as_deref(), Some("Fun"));
    assert_eq!(stored[2].category_name, "Dining Out");
}

#[test]
fn test_add_duplicate_category_rejected() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let groceries = category_id(&db, "Groceries");
    let err = db
        .add_budget_category(&BudgetCategory::new(budget_id, groceries, dec!(10)))
        .unwrap_err();
    assert_eq!(
        budget_error(&err),
        Some(&BudgetError::DuplicateCategory("Groceries".into()))
    );
}

#[test]
fn test_update_category_updates_snapshot() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let mut bc = db.get_budget_categories(budget_id).unwrap().remove(0);
    bc.amount = dec!(500);
    bc.rollover_type = RolloverType::Monthly;
    bc.rollover_cap = Some(dec!(50));
    db.update_budget_category(&bc).unwrap();

    let stored = db.get_budget_categories(budget_id).unwrap().remove(0);
    assert_eq!(stored.amount, dec!(500));
    assert_eq!(stored.rollover_type, RolloverType::Monthly);
    assert_eq!(stored.rollover_cap, Some(dec!(50)));

    let period = db.get_open_period(budget_id).unwrap().unwrap();
    assert_eq!(period.total_budgeted, dec!(3500));
    let snap = db
        .get_period_categories(period.id.unwrap())
        .unwrap()
        .into_iter()
        .find(|s| s.budget_category_id == bc.id)
        .unwrap();
    assert_eq!(snap.budgeted_amount, dec!(500));
    assert_eq!(snap.effective_budget, dec!(500));
}

#[test]
fn test_remove_category_updates_open_period() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let bc = db.get_budget_categories(budget_id).unwrap().remove(0);
    db.remove_budget_category(bc.id.unwrap()).unwrap();

    assert_eq!(db.get_budget_categories(budget_id).unwrap().len(), 1);
    let period = db.get_open_period(budget_id).unwrap().unwrap();
    assert_eq!(period.total_budgeted, dec!(3000));
    assert_eq!(db.get_period_categories(period.id.unwrap()).unwrap().len(), 1);

    let err = db.remove_budget_category(bc.id.unwrap()).unwrap_err();
    assert!(matches!(budget_error(&err), Some(BudgetError::CategoryNotFound(_))));
}

// ── Alerts ────────────────────────────────────────────────────

fn candidate(t: AlertType, severity: AlertSeverity, cat: Option<i64>) -> AlertCandidate {
    AlertCandidate {
        alert_type: t,
        severity,
        budget_category_id: cat,
        message: format!("{} alert", t.as_str()),
    }
}

#[test]
fn test_alerts_deduped_per_period() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let bc_id = db.get_budget_categories(budget_id).unwrap()[0].id;
    let march = date(2024, 3, 1);

    let first = db
        .insert_alerts_deduped(
            budget_id,
            march,
            vec![
                candidate(AlertType::ThresholdWarning, AlertSeverity::Warning, bc_id),
                candidate(AlertType::IncomeShortfall, AlertSeverity::Warning, None),
            ],
        )
        .unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|a| a.id.is_some()));

    let again = db
        .insert_alerts_deduped(
            budget_id,
            march,
            vec![
                candidate(AlertType::ThresholdWarning, AlertSeverity::Warning, bc_id),
                candidate(AlertType::OverBudget, AlertSeverity::Critical, bc_id),
            ],
        )
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].alert_type, AlertType::OverBudget);

    // A new period starts a fresh dedup window.
    let april = db
        .insert_alerts_deduped(
            budget_id,
            date(2024, 4, 1),
            vec![candidate(AlertType::ThresholdWarning, AlertSeverity::Warning, bc_id)],
        )
        .unwrap();
    assert_eq!(april.len(), 1);
    assert_eq!(db.get_alerts_for_period(budget_id, march).unwrap().len(), 3);
}

#[test]
fn test_alert_read_and_emailed() {
    let mut db = Database::open_in_memory().unwrap();
    let (_, budget_id) = seed_budget(&mut db);
    let inserted = db
        .insert_alerts_deduped(
            budget_id,
            date(2024, 3, 1),
            vec![
                candidate(AlertType::OverBudget, AlertSeverity::Critical, Some(1)),
                candidate(AlertType::PositiveMilestone, AlertSeverity::Info, None),
            ],
        )
        .unwrap();
    let ids: Vec<i64> = inserted.iter().filter_map(|a| a.id).collect();

    assert_eq!(db.count_unread_alerts(budget_id).unwrap(), 2);
    assert!(db.mark_alert_read(ids[0]).unwrap());
    assert!(!db.mark_alert_read(9999).unwrap());
    assert_eq!(db.count_unread_alerts(budget_id).unwrap(), 1);
    assert_eq!(db.get_alerts(budget_id, true).unwrap().len(), 1);
    assert_eq!(db.get_alerts(budget_id, false).unwrap().len(), 2);

    db.mark_alerts_emailed(&ids).unwrap();
    assert!(db.get_alerts(budget_id, false).unwrap().iter().all(|a| a.emailed));
}
