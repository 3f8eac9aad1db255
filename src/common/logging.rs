//! Logging and tracing configuration
//!
//! Human-facing progress goes to stdout through the report printer; tracing
//! output goes to stderr so `--json` reports stay machine-readable.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Log file name inside the log directory
const LOG_FILE: &str = "harness.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("collab_harness=info,warn"))
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing to stderr plus a log file in the data directory
///
/// The returned guard flushes the non-blocking writer and must be held for
/// the lifetime of the program. Falls back to [`init_cli`] if the log
/// directory cannot be created.
pub fn init_with_file() -> Option<(WorkerGuard, PathBuf)> {
    let log_dir = match paths::log_dir() {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => dir,
        _ => {
            init_cli();
            return None;
        }
    };

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .init();

    Some((guard, log_dir.join(LOG_FILE)))
}
