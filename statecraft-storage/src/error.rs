//! Storage error types.

use statecraft_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the history stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data corruption in {} at line {line}: {reason}", .path.display())]
    Corruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::HistoryFailed(Box::new(err))
    }
}
