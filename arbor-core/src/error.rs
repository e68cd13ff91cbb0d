//! ``src/error.rs``
//! ============================================================================
//! # `CoreError`: unified error type
//!
//! The engine itself degrades to false/empty/no-op results instead of
//! erroring (unknown node, no common ancestor, and so on). Errors are for
//! the surfaces where I/O and parsing genuinely fail: configuration files
//! and the logging bootstrap.

use std::{io, path::PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// TOML config serialization error.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Config file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No platform config directory could be determined.
    #[error("No usable config directory on this platform")]
    NoConfigDir,

    /// Lookup of a node id that is not registered.
    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    /// Logging bootstrap failure.
    #[error("Logging setup error: {0}")]
    Logging(String),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl CoreError {
    /// Create a config I/O error carrying the offending path.
    pub fn config_io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }
}

// Allow conversion from `anyhow::Error` as fallback.
impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e.to_string())
    }
}
