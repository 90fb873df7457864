//! Outbound email. Delivery is someone else's job: mailers either log the
//! message or drop it into a spool directory for an MTA to pick up.

mod compose;

use anyhow::{Context, Result};
use std::cell::Cell;
use std::path::PathBuf;
use tracing::info;

pub(crate) use compose::{critical_alerts_email, weekly_digest_email, DigestEntry};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Email {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) subject: String,
    pub(crate) body: String,
}

impl Email {
    /// RFC 5322-ish rendering used by the spool.
    pub(crate) fn render(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
            self.from, self.to, self.subject, self.body
        )
    }
}

pub(crate) trait Mailer {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Writes nothing anywhere; records the send in the log.
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email queued (log only)");
        Ok(())
    }
}

/// One file per message in `dir`, named so a directory listing sorts by send order.
pub(crate) struct SpoolMailer {
    dir: PathBuf,
    seq: Cell<u32>,
}

impl SpoolMailer {
    pub(crate) fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create mail spool: {}", dir.display()))?;
        Ok(Self {
            dir,
            seq: Cell::new(0),
        })
    }
}

impl Mailer for SpoolMailer {
    fn send(&self, email: &Email) -> Result<()> {
        let n = self.seq.get() + 1;
        self.seq.set(n);
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f");
        let path = self.dir.join(format!("{stamp}-{n:04}.eml"));
        std::fs::write(&path, email.render())
            .with_context(|| format!("Failed to spool email to {}", path.display()))?;
        info!(to = %email.to, path = %path.display(), "Email spooled");
        Ok(())
    }
}
