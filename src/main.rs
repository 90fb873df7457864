mod alerts;
mod budgeting;
mod config;
mod db;
mod error;
mod import;
mod jobs;
mod models;
mod notify;
mod run;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = run::Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;
    init_logging(&config.log_level, cli.verbose);

    let db_path = config.database_path()?;
    debug!(path = %db_path.display(), "Opening database");
    let mut db = db::Database::open(&db_path)?;

    run::execute(cli.command, &mut db, &config)
}

/// `--verbose` forces debug; otherwise `RUST_LOG` wins over the configured level.
fn init_logging(level: &str, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        let default_level: LevelFilter = level.parse().unwrap_or(LevelFilter::INFO);
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
