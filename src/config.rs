use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::alerts::Thresholds;
use crate::notify::{LogMailer, Mailer, SpoolMailer};

const ENV_PREFIX: &str = "BUDGETCYCLE_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Error, Debug, PartialEq)]
pub(crate) enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid alert thresholds: warning {0}% must be above 0 and below critical {1}% (max 100)")]
    InvalidThresholds(u32, u32),

    #[error("Mail sender address cannot be empty")]
    EmptySender,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Defaults to `budgetcycle.db` in the platform data directory.
    pub(crate) database_path: Option<PathBuf>,
    pub(crate) log_level: String,
    pub(crate) alerts: AlertConfig,
    pub(crate) mail: MailConfig,
}

/// Thresholds for users without a stored notification preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AlertConfig {
    pub(crate) warning_pct: u32,
    pub(crate) critical_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct MailConfig {
    pub(crate) spool_dir: Option<PathBuf>,
    pub(crate) from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".into(),
            alerts: AlertConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            warning_pct: 75,
            critical_pct: 90,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            spool_dir: None,
            from: "budgetcycle@localhost".into(),
        }
    }
}

impl Config {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `explicit` when given, else `config.toml` in the platform config dir
    /// 3. Environment variables (`BUDGETCYCLE_*`, nested keys split on `__`)
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => project_dirs().map(|dirs| dirs.config_dir().join("config.toml")),
        };

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .context("Failed to extract configuration from figment")?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        let AlertConfig {
            warning_pct,
            critical_pct,
        } = self.alerts;
        if warning_pct == 0 || warning_pct >= critical_pct || critical_pct > 100 {
            return Err(ConfigError::InvalidThresholds(warning_pct, critical_pct));
        }
        if self.mail.from.trim().is_empty() {
            return Err(ConfigError::EmptySender);
        }
        Ok(())
    }

    /// Resolve the database file, creating its parent directory.
    pub(crate) fn database_path(&self) -> Result<PathBuf> {
        let path = match &self.database_path {
            Some(path) => path.clone(),
            None => project_dirs()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
                .data_dir()
                .join("budgetcycle.db"),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }
        Ok(path)
    }

    pub(crate) fn thresholds(&self) -> Thresholds {
        Thresholds {
            warning_pct: Decimal::from(self.alerts.warning_pct),
            critical_pct: Decimal::from(self.alerts.critical_pct),
        }
    }

    pub(crate) fn mailer(&self) -> Result<Box<dyn Mailer>> {
        Ok(match &self.mail.spool_dir {
            Some(dir) => Box::new(SpoolMailer::new(dir.clone())?),
            None => Box::new(LogMailer),
        })
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "budgetcycle", "BudgetCycle")
}
