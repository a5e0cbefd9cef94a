pub mod calendar_ids;
pub mod config;
pub mod error;

pub use calendar_ids::{parse_calendar_ids, read_calendar_ids};
pub use config::{
    Config, GoogleConfig, LoggingConfig, NotificationsConfig, ReminderPrecedence,
    RemindersConfig, SchedulerConfig, ValidationResult,
};
pub use error::{AppError, AuthError, ConfigError, NetworkError, ReqwestErrorExt};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing/logging.
///
/// With `logging.file` set, output goes to that file through a non-blocking
/// writer; keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let guard = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            let file_name = path
                .file_name()
                .context("logging.file has no file name")?;
            std::fs::create_dir_all(&dir).context("Failed to create log directory")?;

            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
            None
        }
    };

    tracing::info!("calnotify core initialized");
    Ok(guard)
}
