//! File logging for the hook binary.
//!
//! stdout carries the decision document and stderr is shown to the user, so
//! diagnostics go to `<root>/logs/hook.log`. Logging is best effort: any
//! failure to set it up leaves the hook running without a subscriber.

use fs_err as fs;
use helper_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// EnvFilter directives for the hook log, e.g. `debug` or `helper_core=trace`.
pub const LOG_ENV: &str = "CLAUDE_HELPER_LOG";

/// The returned guard flushes buffered lines on drop; hold it for all of `main`.
pub fn init(storage: Option<&StorageConfig>) -> Option<WorkerGuard> {
    let dir = storage?.logs_dir();
    fs::create_dir_all(&dir).ok()?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("hook.log")
        .build(&dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}
