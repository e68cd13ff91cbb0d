use thiserror::Error;
use uuid::Uuid;

pub type ClipResult<T> = Result<T, ClipError>;

/// Error type for clipboard operations.
#[derive(Error, Debug, Clone)]
pub enum ClipError {
    #[error("Clipboard is full (max {max} entries)")]
    ClipboardFull { max: usize },

    #[error("Entry already on clipboard: {0}")]
    DuplicateEntry(Uuid),

    #[error("Nothing staged for the requested operation")]
    EmptySelection,

    #[error("Clipboard configuration error: {0}")]
    ConfigError(String),
}

impl ClipError {
    /// Whether a caller can sensibly retry after trimming its input.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClipError::ClipboardFull { .. } | ClipError::DuplicateEntry(_) | ClipError::EmptySelection
        )
    }
}
