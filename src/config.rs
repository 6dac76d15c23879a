//! Runtime settings assembled from the command line.

use crate::export::ExportFormat;
use crate::logging::{parse_log_level, LoggingConfig};
use crate::Args;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sampling interval must be a positive number of seconds, got {0}")]
    Interval(f64),

    #[error("history capacity must be at least 1")]
    Capacity,

    #[error("export interval must be a positive number of seconds, got {0}")]
    ExportInterval(f64),

    #[error("invalid log level: {0}. Use trace, debug, info, warn, or error")]
    LogLevel(String),
}

/// Validated settings for one agent run
#[derive(Debug, Clone)]
pub struct Settings {
    pub interval: Duration,
    pub capacity: usize,
    pub data_dir: PathBuf,
    pub chart_dir: PathBuf,
    pub export_format: ExportFormat,
    pub export_interval: Option<Duration>,
    pub export_on_exit: bool,
    pub duration: Option<Duration>,
    pub tui: bool,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let interval = positive_secs(args.interval).ok_or(ConfigError::Interval(args.interval))?;
        if args.capacity == 0 {
            return Err(ConfigError::Capacity);
        }
        let export_interval = match args.export_interval {
            Some(secs) => Some(positive_secs(secs).ok_or(ConfigError::ExportInterval(secs))?),
            None => None,
        };
        parse_log_level(&args.log_level)?;

        Ok(Self {
            interval,
            capacity: args.capacity,
            data_dir: args.data_dir.clone(),
            chart_dir: args.chart_dir.clone(),
            export_format: args.export_format,
            export_interval,
            export_on_exit: args.export_on_exit,
            duration: args.duration.map(Duration::from_secs),
            tui: !args.no_tui,
            logging: LoggingConfig {
                level: args.log_level.clone(),
                directory: args.log_dir.clone(),
                max_files: args.log_files,
                console: args.no_tui,
            },
        })
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
}
