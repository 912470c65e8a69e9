//! Error types for the sync engine.

use serde::Serialize;
use thiserror::Error;

/// Main error type for window resolution and copy operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Cannot access folder: {0}")]
    FolderInaccessible(String),

    #[error("Destination path is not a filesystem path: {0}")]
    DestinationNotFilesystem(String),

    #[error("Cannot create destination folder: {0}")]
    CannotCreateDestination(String),

    #[error("Shell query failed: {0}")]
    ShellQuery(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Source and destination are the same folder: {0}")]
    SameSourceAndDestination(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Resolution errors abort a whole invocation; everything else is per-file
    /// or infrastructural.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            SyncError::WindowNotFound(_)
                | SyncError::FolderNotFound(_)
                | SyncError::FolderInaccessible(_)
                | SyncError::DestinationNotFilesystem(_)
                | SyncError::CannotCreateDestination(_)
                | SyncError::SameSourceAndDestination(_)
        )
    }
}

impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// What a caller sees when an invocation fails as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct FailureResponse {
    pub ok: bool,
    pub error: String,
}

impl From<&SyncError> for FailureResponse {
    fn from(err: &SyncError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_message() {
        let err = SyncError::FolderNotFound("DCIM".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Folder not found: DCIM\"");
    }

    #[test]
    fn test_failure_response_shape() {
        let err = SyncError::DestinationNotFilesystem("Phone".into());
        let value = serde_json::to_value(FailureResponse::from(&err)).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(
            value["error"],
            "Destination path is not a filesystem path: Phone"
        );
    }

    #[test]
    fn test_resolution_classification() {
        assert!(SyncError::WindowNotFound("1".into()).is_resolution());
        assert!(SyncError::CannotCreateDestination("x".into()).is_resolution());
        assert!(SyncError::SameSourceAndDestination("DCIM".into()).is_resolution());
        assert!(!SyncError::Timeout("x".into()).is_resolution());
        assert!(!SyncError::CopyFailed("x".into()).is_resolution());
    }
}
