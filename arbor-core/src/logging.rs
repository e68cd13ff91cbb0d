//! ``src/logging.rs``
//! ============================================================================
//! # Logging bootstrap
//!
//! Structured tracing to a rolling file. Engine modules emit events with
//! `marker` and `operation_type` fields; the host application decides when
//! (and whether) to install this subscriber. The returned guard must stay
//! alive for the worker thread to keep flushing.

use std::path::PathBuf;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,

    /// EnvFilter directive, e.g. `info` or `arbor_core::fetch=debug`.
    pub log_level: CompactString,

    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("arbor"),
            log_level: CompactString::const_new("info"),
            rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),
}

/// Install the global subscriber. Call once, early; keep the guard.
pub fn init(config: &LoggerConfig) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&config.log_dir)?;

    let rotation = match config.rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Daily => Rotation::DAILY,
    };
    let appender = RollingFileAppender::new(
        rotation,
        &config.log_dir,
        config.log_file_prefix.as_str(),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(config.log_level.as_str())
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}
