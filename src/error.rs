//! Error types for archive loading and extraction.
//!
//! Every variant renders as the human-readable message the reader exposes on
//! its `error_string` and in [`ExtractionEvent::Finished`](crate::ExtractionEvent).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors raised while reading a ZIP directory or running an extraction.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // Structural errors: fatal to the current load.
    #[error("File not found.")]
    NotFound,

    #[error("Unable to open archive.")]
    Open(#[source] io::Error),

    #[error("Invalid ZIP file.")]
    TooSmall,

    #[error("ZIP central directory not found.")]
    EocdNotFound,

    #[error("ZIP64 archives are not supported.")]
    Zip64Unsupported,

    #[error("ZIP central directory is out of bounds.")]
    DirectoryOutOfBounds,

    #[error("Corrupt ZIP central directory.")]
    CorruptDirectory,

    #[error("Failed to read entry name.")]
    TruncatedName,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Environment errors: the requested job is never started.
    #[error("Extraction already in progress.")]
    AlreadyExtracting,

    #[error("No ZIP source selected.")]
    NoSource,

    #[error("ZIP source does not exist.")]
    SourceMissing,

    #[error("Please select a destination folder.")]
    NoDestination,

    #[error("Unable to create destination folder.")]
    DestinationUnavailable(#[source] io::Error),

    #[error("Custom extractor not found: {0}")]
    CustomExtractorMissing(String),

    #[error("No extraction backend is available.")]
    NoBackend,

    // Backend errors: fatal to the running job only.
    #[error("Failed to start extraction process: {0}")]
    Launch(#[source] io::Error),

    #[error("{0}")]
    BackendFailed(String),

    #[error("Extraction worker failed: {0}")]
    Worker(String),

    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("Failed to decompress {name}: {source}")]
    Decompress {
        name: String,
        #[source]
        source: io::Error,
    },

    // Selective drag-extraction.
    #[error("No matching entry found to drag.")]
    NoMatchingEntry,

    #[error("Invalid entry path: {0}")]
    InvalidEntryPath(String),

    #[error("Unable to create drag session folder {}: {source}", path.display())]
    Session {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    /// True for the ZIP64 rejection, which no fallback parser may override.
    pub fn is_zip64(&self) -> bool {
        matches!(self, ArchiveError::Zip64Unsupported)
    }

    /// Errors after which retrying with another manifest backend is pointless.
    pub(crate) fn is_final_for_load(&self) -> bool {
        matches!(
            self,
            ArchiveError::Zip64Unsupported | ArchiveError::NotFound | ArchiveError::Open(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(ArchiveError::TooSmall.to_string(), "Invalid ZIP file.");
        assert_eq!(
            ArchiveError::CustomExtractorMissing("7zz".into()).to_string(),
            "Custom extractor not found: 7zz"
        );
        assert_eq!(
            ArchiveError::BackendFailed("unzip: cannot find zipfile".into()).to_string(),
            "unzip: cannot find zipfile"
        );
    }

    #[test]
    fn zip64_is_final() {
        assert!(ArchiveError::Zip64Unsupported.is_zip64());
        assert!(ArchiveError::Zip64Unsupported.is_final_for_load());
        assert!(!ArchiveError::CorruptDirectory.is_final_for_load());
    }
}
