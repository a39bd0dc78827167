//! Tracing setup for the desk server.
//!
//! Two sinks: a daily-rolled `livedesk.log` for post-mortems of closed
//! conversations, and stderr for the operator watching `livedesk serve`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "livedesk.log";

/// Chat engine internals at debug, everything else (axum, hyper) at info.
const DEFAULT_FILTER: &str = "info,livedesk=debug";

/// Install the global subscriber.
///
/// The guard must outlive every conversation: dropping it stops the
/// background writer, and transcripts handed to the log after that are lost.
pub fn init() -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // No ANSI escapes in the file
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(log_dir = %log_dir.display(), "Desk logging ready");
    Ok((guard, log_dir))
}

fn log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "livedesk", "livedesk")
        .ok_or_else(|| anyhow::anyhow!("No data directory for transcript logs"))?;

    Ok(dirs.data_dir().join("logs"))
}

/// Test subscriber routed through libtest's capture. Repeat calls are no-ops.
#[cfg(test)]
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
