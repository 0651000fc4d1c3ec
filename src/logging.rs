//! Logging Module
//!
//! Structured logging with file output for diagnostics.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging: daily-rotated file output plus console.
///
/// Honors `RUST_LOG`; defaults keep the HTTP stack quiet.
pub fn init() {
    let log_dir = log_directory();
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "safetour-client.log");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_appender),
        )
        .with(fmt::layer().with_target(true));

    // An embedding shell (or the test runner) may have installed one already.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("SafeTour")
        .join("logs")
}
