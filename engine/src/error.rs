//! Error types for the transfer, search and trash engines.
//!
//! `EngineError` represents failures of a single filesystem step. The run
//! loops never let it escape across their event boundary: a failing transfer
//! item becomes an `ItemResult` with `success == false`, a missing search root
//! becomes a `SearchEvent::Error`. Only precondition checks (running a plan
//! twice, loading a corrupt settings file) surface it to the caller directly.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Search root does not exist
    #[error("Search root does not exist: {}", path.display())]
    SearchRootNotFound { path: PathBuf },

    /// Failed to read from a source file
    #[error("Failed to read {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    #[error("Failed to write {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to remove an existing entry
    #[error("Failed to remove {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to rename an entry in place
    #[error("Failed to rename {} to {}: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Failed to recreate a symbolic link
    #[error("Failed to copy link {}: {source}", path.display())]
    SymlinkFailed { path: PathBuf, source: io::Error },

    /// Failed to stat or update metadata
    #[error("Failed to access metadata of {}: {source}", path.display())]
    MetadataFailed { path: PathBuf, source: io::Error },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Source and destination checksums differ after a verified copy
    #[error("Checksum verification failed: {} differs from {}", destination.display(), source_path.display())]
    ChecksumMismatch {
        source_path: PathBuf,
        destination: PathBuf,
    },

    /// Operation attempted in the wrong lifecycle state
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Settings file could not be parsed or written
    #[error("Invalid settings file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Cooperative cancellation interrupted the current step
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn enumeration(path: impl Into<PathBuf>, err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_else(|| path.into());
        EngineError::EnumerationFailed {
            path,
            source: err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_path() {
        let err = EngineError::SearchRootNotFound {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(err.to_string(), "Search root does not exist: /nope");
    }
}
