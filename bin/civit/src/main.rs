//! civit – entry point.
//!
//! Startup order:
//! 1. Parse the command line and load configuration (file, env, flags).
//! 2. Initialise tracing on stderr, plus an optional daily log file.
//! 3. Dispatch the subcommand.

mod cli;
mod commands;
mod config;

use std::path::Path;

use clap::Parser;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::Cli;
use crate::commands::Context;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    apply_flags(&mut cfg, &cli);

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Held until exit so buffered file output is flushed.
    let _log_guard = init_tracing(&cfg);
    debug!(version = env!("CARGO_PKG_VERSION"), database_url = %cfg.database_url, "civit starting");

    // ── 3. Command ─────────────────────────────────────────────────────────────
    let ctx = Context::new(cfg);
    commands::run(&ctx, cli.command).await
}

/// Command-line flags override file and environment settings.
fn apply_flags(cfg: &mut Config, cli: &Cli) {
    if let Some(db) = &cli.database {
        cfg.database_url = db.clone();
    }
    if let Some(key) = cli.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        cfg.api_key = Some(key.to_owned());
    }
    match cli.verbose {
        0 => {}
        1 => cfg.log_level = "debug".to_owned(),
        _ => cfg.log_level = "trace".to_owned(),
    }
    if cli.log_json {
        cfg.log_json = true;
    }
}

fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CIVIT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);
    let console = if cfg.log_json { console.json().boxed() } else { console.boxed() };

    let (file, guard) = match cfg.log_file.as_deref().and_then(rolling_file) {
        Some((writer, guard)) => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json().boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
    guard
}

/// Daily-rotated, non-blocking writer for `path` (`<dir>/<name>.YYYY-MM-DD`).
fn rolling_file(path: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let Some(name) = path.file_name() else {
        eprintln!("WARN: log file '{}' has no file name; file logging disabled", path.display());
        return None;
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("WARN: cannot create log directory '{}' ({e}); file logging disabled", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, name);
    Some(tracing_appender::non_blocking(appender))
}
