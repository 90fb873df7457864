//! Scheduled batch jobs.
//!
//! Each job walks budgets (or users) one at a time. A failure on one budget
//! is logged and counted in the [`JobReport`]; the batch carries on.

mod close;
mod daily_alerts;
mod digest;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

use crate::alerts::Thresholds;
use crate::db::Database;
use crate::notify::Mailer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    ClosePeriods,
    DailyAlerts,
    WeeklyDigest,
}

impl Job {
    pub(crate) fn all() -> &'static [Job] {
        &[Job::ClosePeriods, Job::DailyAlerts, Job::WeeklyDigest]
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::ClosePeriods => "close-periods",
            Self::DailyAlerts => "daily-alerts",
            Self::WeeklyDigest => "weekly-digest",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|job| job.name().eq_ignore_ascii_case(s.trim()))
    }

    /// Standard five-field cron expression, as shown to users.
    pub(crate) fn cron_expression(&self) -> &'static str {
        match self {
            Self::ClosePeriods => "0 0 1 * *",
            Self::DailyAlerts => "0 7 * * *",
            Self::WeeklyDigest => "0 7 * * 1",
        }
    }

    /// The same schedule in the seconds-first form the `cron` crate parses.
    /// Weekdays are spelled out: that crate numbers Sunday as 1.
    fn schedule_expression(&self) -> &'static str {
        match self {
            Self::ClosePeriods => "0 0 0 1 * *",
            Self::DailyAlerts => "0 0 7 * * *",
            Self::WeeklyDigest => "0 0 7 * * Mon",
        }
    }

    pub(crate) fn schedule(&self) -> Result<Schedule> {
        Schedule::from_str(self.schedule_expression())
            .with_context(|| format!("Invalid schedule for job {}", self.name()))
    }

    /// True when a fire time falls in `(last_run, now]`. Without a prior run
    /// the window reaches back one day.
    pub(crate) fn is_due<Tz: TimeZone>(
        &self,
        last_run: Option<&DateTime<Tz>>,
        now: &DateTime<Tz>,
    ) -> Result<bool> {
        let since = match last_run {
            Some(at) => at.clone(),
            None => now.clone() - Duration::days(1),
        };
        Ok(self
            .schedule()?
            .after(&since)
            .next()
            .is_some_and(|next| next <= *now))
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct JobReport {
    /// Budgets (or users, for the digest) handled without error.
    pub(crate) processed: usize,
    pub(crate) failed: usize,
    pub(crate) periods_closed: usize,
    pub(crate) alerts_created: usize,
    pub(crate) emails_sent: usize,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} failed, {} periods closed, {} alerts, {} emails",
            self.processed, self.failed, self.periods_closed, self.alerts_created, self.emails_sent
        )
    }
}

/// Everything a job run needs.
pub(crate) struct JobContext<'a> {
    pub(crate) db: &'a mut Database,
    pub(crate) mailer: &'a dyn Mailer,
    /// Used for users without a notification preference.
    pub(crate) default_thresholds: Thresholds,
    pub(crate) sender: &'a str,
    pub(crate) today: NaiveDate,
    /// Stamped on periods the run closes.
    pub(crate) now: DateTime<Utc>,
}

pub(crate) fn run_job(job: Job, ctx: &mut JobContext<'_>) -> Result<JobReport> {
    let report = match job {
        Job::ClosePeriods => close::close_due_periods(ctx)?,
        Job::DailyAlerts => daily_alerts::generate_daily_alerts(ctx)?,
        Job::WeeklyDigest => digest::send_weekly_digests(ctx)?,
    };
    info!(
        job = job.name(),
        processed = report.processed,
        failed = report.failed,
        "Job finished: {report}"
    );
    Ok(report)
}

/// Run every job whose schedule fired since its last recorded run, then
/// record the run. A job that errors as a whole is logged and not recorded,
/// so the next tick tries it again.
pub(crate) fn tick<Tz: TimeZone>(
    ctx: &mut JobContext<'_>,
    now: &DateTime<Tz>,
) -> Result<Vec<(Job, JobReport)>>
where
    Tz::Offset: fmt::Display,
{
    ctx.today = now.date_naive();
    ctx.now = now.with_timezone(&Utc);
    let mut ran = Vec::new();
    for &job in Job::all() {
        let last_run = ctx
            .db
            .get_last_job_run(job.name())?
            .map(|at| at.with_timezone(&now.timezone()));
        if !job.is_due(last_run.as_ref(), now)? {
            continue;
        }
        match run_job(job, ctx) {
            Ok(report) => {
                ctx.db.record_job_run(job.name(), now)?;
                ran.push((job, report));
            }
            Err(err) => error!(job = job.name(), error = %err, "Job failed"),
        }
    }
    Ok(ran)
}

#[cfg(test)]
mod tests;
