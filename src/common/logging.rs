//! Logging and tracing configuration
//!
//! Every run writes to stderr and to a timestamped log file. The file
//! writer is non-blocking; the returned [`LogSession`] owns its worker and
//! flushes pending lines when dropped, so it must live until the run ends.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{paths, Error, Result};

/// An open log sink for one process run
pub struct LogSession {
    path: PathBuf,
    _guard: WorkerGuard,
}

impl LogSession {
    /// Path of the log file receiving this run's output
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the log file
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "Closing log file");
    }
}

/// Initialize tracing for a run (stderr + log file)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init(log_dir: &Path) -> Result<LogSession> {
    std::fs::create_dir_all(log_dir)?;

    let path = paths::log_file_path(log_dir, chrono::Local::now());
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::LogInit(format!("invalid log path '{}'", path.display())))?;

    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("onboard=info,warn"));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::LogInit(e.to_string()))?;

    Ok(LogSession {
        path,
        _guard: guard,
    })
}

/// Initialize stderr-only logging for failures that happen before the log
/// directory is known
pub fn init_stderr() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("onboard=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .try_init();
}
