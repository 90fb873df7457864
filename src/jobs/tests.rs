#![allow(clippy::unwrap_used)]

use super::daily_alerts::build_alert_context;
use super::digest::digest_entries;
use super::*;
use crate::models::{
    Account, AccountType, AlertSeverity, AlertType, Budget, BudgetCategory, BudgetStrategy,
    NotificationPreference, Transaction, User,
};
use crate::error::BudgetError;
use crate::notify::Email;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::{Cell, RefCell};

#[derive(Default)]
struct RecordingMailer {
    sent: RefCell<Vec<Email>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &Email) -> Result<()> {
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

/// Fails the first `failures` sends, then delivers.
struct FlakyMailer {
    failures: Cell<u32>,
    sent: RefCell<Vec<Email>>,
}

impl FlakyMailer {
    fn new(failures: u32) -> Self {
        Self {
            failures: Cell::new(failures),
            sent: RefCell::new(Vec::new()),
        }
    }
}

impl Mailer for FlakyMailer {
    fn send(&self, email: &Email) -> Result<()> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            anyhow::bail!("SMTP connection refused");
        }
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap().and_utc()
}

fn context<'a>(db: &'a mut Database, mailer: &'a dyn Mailer, today: NaiveDate) -> JobContext<'a> {
    JobContext {
        db,
        mailer,
        default_thresholds: Thresholds::default(),
        sender: "budgetcycle@test",
        today,
        now: today.and_hms_opt(6, 0, 0).unwrap().and_utc(),
    }
}

struct Owner {
    account_id: i64,
    budget_id: i64,
    groceries: i64,
}

/// A user with a preference row, one account and a budget of Groceries 400
/// plus Salary 3000 income, first period holding `created`.
fn owner(db: &mut Database, email: &str, created: NaiveDate) -> Owner {
    let user_id = db.insert_user(&User::new(email.into(), "Owner".into())).unwrap();
    db.upsert_preference(&NotificationPreference::new(user_id)).unwrap();
    let account_id = db
        .insert_account(&Account::new(user_id, "Checking".into(), AccountType::Checking))
        .unwrap();
    let groceries = db.ensure_category("Groceries").unwrap();
    let salary = db.ensure_category("Salary").unwrap();
    let mut income = BudgetCategory::new(0, salary, dec!(3000));
    income.is_income = true;
    let budget_id = db
        .create_budget(
            &Budget::new(user_id, format!("{email} budget"), BudgetStrategy::Fixed),
            &[BudgetCategory::new(0, groceries, dec!(400)), income],
            created,
        )
        .unwrap();
    Owner {
        account_id,
        budget_id,
        groceries,
    }
}

fn spend(db: &Database, owner: &Owner, day: NaiveDate, amount: Decimal, category_id: i64) {
    let mut t = Transaction::new(owner.account_id, day, "Test".into(), amount);
    t.category_id = Some(category_id);
    db.insert_transaction(&t).unwrap();
}

fn close_open_periods(db: &Database, budget_id: i64) {
    db.connection()
        .execute(
            "UPDATE budget_periods SET status = 'CLOSED' WHERE budget_id = ?1",
            [budget_id],
        )
        .unwrap();
}

// ── Schedules ─────────────────────────────────────────────────

#[test]
fn test_job_names() {
    for job in Job::all() {
        assert_eq!(Job::parse(job.name()), Some(*job));
        assert!(job.schedule().is_ok());
    }
    assert_eq!(Job::parse("Daily-Alerts"), Some(Job::DailyAlerts));
    assert_eq!(Job::parse("hourly"), None);
    assert_eq!(Job::WeeklyDigest.cron_expression(), "0 7 * * 1");
}

#[test]
fn test_daily_due_window() {
    let last = at(2024, 5, 5, 7, 0);
    assert!(!Job::DailyAlerts.is_due(Some(&last), &at(2024, 5, 6, 6, 59)).unwrap());
    assert!(Job::DailyAlerts.is_due(Some(&last), &at(2024, 5, 6, 7, 0)).unwrap());
}

#[test]
fn test_first_run_looks_back_one_day() {
    // 2024-05-06 is a Monday.
    let now = at(2024, 5, 6, 8, 0);
    assert!(Job::DailyAlerts.is_due(None, &now).unwrap());
    assert!(Job::WeeklyDigest.is_due(None, &now).unwrap());
    assert!(!Job::ClosePeriods.is_due(None, &now).unwrap());

    // A Tuesday morning has no weekly fire in the last day.
    assert!(!Job::WeeklyDigest.is_due(None, &at(2024, 5, 7, 8, 0)).unwrap());
}

#[test]
fn test_monthly_close_due_on_first() {
    let last = at(2024, 5, 1, 0, 0);
    assert!(!Job::ClosePeriods.is_due(Some(&last), &at(2024, 5, 31, 23, 59)).unwrap());
    assert!(Job::ClosePeriods.is_due(Some(&last), &at(2024, 6, 1, 0, 0)).unwrap());
}

// ── Close periods ─────────────────────────────────────────────

#[test]
fn test_close_periods_catches_up() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 1, 15));
    let mailer = RecordingMailer::default();

    let report = run_job(Job::ClosePeriods, &mut context(&mut db, &mailer, date(2024, 3, 2))).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.periods_closed, 2);

    let open = db.get_open_period(o.budget_id).unwrap().unwrap();
    assert_eq!(open.period_start, date(2024, 3, 1));
    let periods = db.get_periods(o.budget_id).unwrap();
    assert_eq!(periods.len(), 3);
    for closed in periods.iter().filter(|p| !p.is_open()) {
        assert_eq!(closed.closed_at.as_deref(), Some("2024-03-02T06:00:00+00:00"));
    }

    let again = run_job(Job::ClosePeriods, &mut context(&mut db, &mailer, date(2024, 3, 2))).unwrap();
    assert_eq!(again.periods_closed, 0);
}

#[test]
fn test_close_skips_inactive_budgets() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 1, 15));
    db.set_budget_active(o.budget_id, false, date(2024, 1, 20)).unwrap();
    let mailer = RecordingMailer::default();

    let report = run_job(Job::ClosePeriods, &mut context(&mut db, &mailer, date(2024, 3, 2))).unwrap();
    assert_eq!(report, JobReport::default());
    assert_eq!(db.get_periods(o.budget_id).unwrap().len(), 1);
}

#[test]
fn test_close_reopens_missing_period() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 1, 15));
    close_open_periods(&db, o.budget_id);
    let mailer = RecordingMailer::default();

    let report = run_job(Job::ClosePeriods, &mut context(&mut db, &mailer, date(2024, 3, 2))).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.periods_closed, 0);
    let open = db.get_open_period(o.budget_id).unwrap().unwrap();
    assert_eq!(open.period_start, date(2024, 3, 1));
}

// ── Daily alerts ──────────────────────────────────────────────

#[test]
fn test_daily_alerts_create_and_email_once() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 3, 1));
    spend(&db, &o, date(2024, 3, 10), dec!(-380), o.groceries);
    let mailer = RecordingMailer::default();

    let report = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 28))).unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.alerts_created >= 1);
    assert_eq!(report.emails_sent, 1);

    let alerts = db.get_alerts(o.budget_id, false).unwrap();
    let critical: Vec<_> = alerts
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].alert_type, AlertType::ThresholdCritical);
    assert!(critical[0].emailed);
    // Nothing received against a 3000 salary late in the month.
    assert!(alerts.iter().any(|a| a.alert_type == AlertType::IncomeShortfall));

    {
        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@test");
        assert_eq!(sent[0].from, "budgetcycle@test");
    }

    let again = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 29))).unwrap();
    assert_eq!(again.alerts_created, 0);
    assert_eq!(again.emails_sent, 0);
    assert_eq!(mailer.sent.borrow().len(), 1);
}

#[test]
fn test_daily_alerts_respect_email_preference() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 3, 1));
    let user_id = db.require_budget(o.budget_id).unwrap().user_id;
    let mut pref = db.get_preference(user_id).unwrap().unwrap();
    pref.email_alerts = false;
    db.upsert_preference(&pref).unwrap();
    spend(&db, &o, date(2024, 3, 10), dec!(-500), o.groceries);
    let mailer = RecordingMailer::default();

    let report = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 28))).unwrap();
    assert!(report.alerts_created >= 1);
    assert_eq!(report.emails_sent, 0);
    assert!(mailer.sent.borrow().is_empty());
    assert!(db
        .get_alerts(o.budget_id, false)
        .unwrap()
        .iter()
        .any(|a| a.alert_type == AlertType::OverBudget && !a.emailed));
}

#[test]
fn test_daily_alerts_retry_failed_email() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 3, 1));
    spend(&db, &o, date(2024, 3, 10), dec!(-380), o.groceries);
    let mailer = FlakyMailer::new(1);

    let first = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 28))).unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.processed, 0);
    assert!(first.alerts_created >= 1);
    assert_eq!(first.emails_sent, 0);
    let pending = db
        .get_unemailed_alerts(o.budget_id, date(2024, 3, 1), AlertSeverity::Critical)
        .unwrap();
    assert_eq!(pending.len(), 1);

    let second = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 29))).unwrap();
    assert_eq!(second.failed, 0);
    assert_eq!(second.processed, 1);
    assert_eq!(second.alerts_created, 0);
    assert_eq!(second.emails_sent, 1);
    assert_eq!(mailer.sent.borrow().len(), 1);
    assert!(db
        .get_unemailed_alerts(o.budget_id, date(2024, 3, 1), AlertSeverity::Critical)
        .unwrap()
        .is_empty());
}

#[test]
fn test_daily_alerts_without_preference_use_defaults() {
    let mut db = Database::open_in_memory().unwrap();
    let user_id = db.insert_user(&User::new("nopref@test".into(), "No Pref".into())).unwrap();
    let account_id = db
        .insert_account(&Account::new(user_id, "Checking".into(), AccountType::Checking))
        .unwrap();
    let groceries = db.ensure_category("Groceries").unwrap();
    let budget_id = db
        .create_budget(
            &Budget::new(user_id, "Home".into(), BudgetStrategy::Fixed),
            &[BudgetCategory::new(0, groceries, dec!(400))],
            date(2024, 3, 1),
        )
        .unwrap();
    let mut t = Transaction::new(account_id, date(2024, 3, 2), "Market".into(), dec!(-220));
    t.category_id = Some(groceries);
    db.insert_transaction(&t).unwrap();
    assert!(db.get_preference(user_id).unwrap().is_none());

    let mailer = RecordingMailer::default();
    let mut ctx = context(&mut db, &mailer, date(2024, 3, 28));
    ctx.default_thresholds = Thresholds {
        warning_pct: dec!(50),
        critical_pct: dec!(60),
    };
    let report = run_job(Job::DailyAlerts, &mut ctx).unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.processed, 1);
    assert_eq!(report.emails_sent, 0);
    assert!(mailer.sent.borrow().is_empty());

    let types: Vec<AlertType> = db
        .get_alerts(budget_id, false)
        .unwrap()
        .iter()
        .map(|a| a.alert_type)
        .collect();
    assert!(types.contains(&AlertType::ThresholdWarning));
    assert!(!types.contains(&AlertType::ThresholdCritical));
}

#[test]
fn test_daily_alerts_skip_period_behind_today() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 2, 10));
    spend(&db, &o, date(2024, 3, 2), dec!(-500), o.groceries);
    let mailer = RecordingMailer::default();

    let report = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 5))).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.alerts_created, 0);
    assert!(db.get_alerts(o.budget_id, false).unwrap().is_empty());

    let budget = db.require_budget(o.budget_id).unwrap();
    let err = build_alert_context(&db, &budget, date(2024, 3, 5), Thresholds::default()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BudgetError>(),
        Some(&BudgetError::PeriodBehind {
            budget_id: o.budget_id,
            period_start: date(2024, 2, 1),
        })
    );
}

#[test]
fn test_daily_alerts_use_user_thresholds() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 3, 1));
    let user_id = db.require_budget(o.budget_id).unwrap().user_id;
    let mut pref = NotificationPreference::new(user_id);
    pref.warning_pct = dec!(50);
    pref.critical_pct = dec!(80);
    db.upsert_preference(&pref).unwrap();
    spend(&db, &o, date(2024, 3, 2), dec!(-220), o.groceries);
    let mailer = RecordingMailer::default();

    run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 28))).unwrap();
    assert!(db
        .get_alerts(o.budget_id, false)
        .unwrap()
        .iter()
        .any(|a| a.alert_type == AlertType::ThresholdWarning));
}

#[test]
fn test_daily_alerts_isolate_failures() {
    let mut db = Database::open_in_memory().unwrap();
    let broken = owner(&mut db, "a@test", date(2024, 3, 1));
    owner(&mut db, "b@test", date(2024, 3, 1));
    close_open_periods(&db, broken.budget_id);
    let mailer = RecordingMailer::default();

    let report = run_job(Job::DailyAlerts, &mut context(&mut db, &mailer, date(2024, 3, 20))).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn test_alert_context_history_order() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 3, 1));
    // April 2023 is the month after the current one, a year back.
    spend(&db, &o, date(2023, 4, 12), dec!(-600), o.groceries);
    spend(&db, &o, date(2023, 3, 12), dec!(-50), o.groceries);
    spend(&db, &o, date(2024, 2, 12), dec!(-70), o.groceries);

    let budget = db.require_budget(o.budget_id).unwrap();
    let ctx = build_alert_context(&db, &budget, date(2024, 3, 5), Thresholds::default()).unwrap();
    assert_eq!(ctx.period_start, date(2024, 3, 1));
    assert_eq!(ctx.period_end, date(2024, 3, 31));

    let groceries = ctx.categories.iter().find(|c| !c.is_income).unwrap();
    assert_eq!(groceries.history.len(), 12);
    assert_eq!(groceries.history[0], dec!(50));
    assert_eq!(groceries.history[1], dec!(600));
    assert_eq!(groceries.history[11], dec!(70));
    assert_eq!(groceries.effective_budget, dec!(400));
}

// ── Weekly digest ─────────────────────────────────────────────

#[test]
fn test_weekly_digest() {
    let mut db = Database::open_in_memory().unwrap();
    let a = owner(&mut db, "a@test", date(2024, 5, 1));
    spend(&db, &a, date(2024, 5, 3), dec!(-100), a.groceries);

    let b = owner(&mut db, "b@test", date(2024, 5, 1));
    let b_user = db.require_budget(b.budget_id).unwrap().user_id;
    let mut pref = db.get_preference(b_user).unwrap().unwrap();
    pref.weekly_digest = false;
    db.upsert_preference(&pref).unwrap();

    // No preference row at all.
    db.insert_user(&User::new("c@test".into(), "C".into())).unwrap();

    let mailer = RecordingMailer::default();
    let report = run_job(Job::WeeklyDigest, &mut context(&mut db, &mailer, date(2024, 5, 6))).unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.emails_sent, 1);

    let sent = mailer.sent.borrow();
    assert_eq!(sent[0].to, "a@test");
    assert!(sent[0].body.contains("$100.00 of $400.00 spent, 25% used"));
}

#[test]
fn test_digest_entries_skip_inactive() {
    let mut db = Database::open_in_memory().unwrap();
    let a = owner(&mut db, "a@test", date(2024, 5, 1));
    let user_id = db.require_budget(a.budget_id).unwrap().user_id;
    assert_eq!(digest_entries(&db, user_id).unwrap().len(), 1);
    db.set_budget_active(a.budget_id, false, date(2024, 5, 2)).unwrap();
    assert!(digest_entries(&db, user_id).unwrap().is_empty());
}

// ── Tick ──────────────────────────────────────────────────────

#[test]
fn test_tick_runs_due_jobs_once() {
    let mut db = Database::open_in_memory().unwrap();
    let o = owner(&mut db, "a@test", date(2024, 5, 1));
    let mailer = RecordingMailer::default();

    let monday = at(2024, 5, 6, 8, 0);
    let ran = tick(&mut context(&mut db, &mailer, date(2000, 1, 1)), &monday).unwrap();
    let jobs: Vec<Job> = ran.iter().map(|(job, _)| *job).collect();
    assert_eq!(jobs, vec![Job::DailyAlerts, Job::WeeklyDigest]);
    assert_eq!(
        db.get_last_job_run("daily-alerts").unwrap().unwrap().timestamp(),
        monday.timestamp()
    );

    let ran = tick(&mut context(&mut db, &mailer, date(2000, 1, 1)), &monday).unwrap();
    assert!(ran.is_empty());

    let first_of_june = at(2024, 6, 1, 0, 30);
    let ran = tick(&mut context(&mut db, &mailer, date(2000, 1, 1)), &first_of_june).unwrap();
    let close = ran
        .iter()
        .find(|(job, _)| *job == Job::ClosePeriods)
        .map(|(_, report)| report.periods_closed);
    assert_eq!(close, Some(1));
    let open = db.get_open_period(o.budget_id).unwrap().unwrap();
    assert_eq!(open.period_start, date(2024, 6, 1));
}
