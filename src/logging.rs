//! Logging setup — grounded on the teacher's `main.rs::setup_logging`.
//!
//! `spec.md` §7: "every transition emits one human-readable line... verbose
//! mode additionally emits per-frame and per-transition trace." Verbose
//! raises the default filter to `debug`; an optional `--log-file` tees
//! output to a rolling file via `tracing-appender`, same as the teacher.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber. Returns the file-appender
/// guard (when a log file is configured) — it must be kept alive for the
/// life of the process or buffered lines are dropped on exit.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let file_name = path.file_name().map(|n| n.to_owned()).unwrap_or_else(|| "relais-agent.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
