//! Diagnostic logging to a rotating file (and stderr when the TUI is off).

use crate::config::ConfigError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "FALCON_LOG";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    /// Number of rotated files kept on disk
    pub max_files: usize,
    /// Also log to stderr (only when nothing else owns the terminal)
    pub console: bool,
}

/// Keeps the background log writer alive. Dropping it flushes pending
/// records and closes the log file, so hold it until shutdown.
#[must_use = "dropping the handle stops file logging"]
pub struct LogHandle {
    _guard: WorkerGuard,
    directory: PathBuf,
}

impl LogHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Install the global subscriber described by `config`
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle> {
    let level = parse_log_level(&config.level)?;
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("Failed to create log directory {}", config.directory.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("falcon-agent")
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(&config.directory)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    info!(level = %level, directory = %config.directory.display(), "Logging initialized");
    Ok(LogHandle {
        _guard: guard,
        directory: config.directory.clone(),
    })
}

/// Parse log level string to tracing Level
pub fn parse_log_level(level: &str) -> std::result::Result<Level, ConfigError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}
