//! Error types for message materialization

use thiserror::Error;

/// Errors raised by an object-store backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The multi-part upload id is unknown (already completed or aborted)
    #[error("Unknown multi-part upload: {0}")]
    UploadNotFound(String),

    /// The backend rejected or failed an operation
    #[error("Storage backend failed during {operation}: {details}")]
    Backend { operation: String, details: String },

    /// Local I/O failure while talking to the backend
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            details: details.into(),
        }
    }
}

/// Errors that can occur while processing one message
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A required request field is missing or empty
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The source key is not under the configured source prefix
    #[error("Key '{key}' does not start with expected prefix '{prefix}'")]
    KeyOutsidePrefix { key: String, prefix: String },

    /// The message could not be parsed as MIME
    #[error("Failed to parse message: {0}")]
    Parse(String),

    /// Reading a part or writing its destination object failed
    #[error("Transfer failed for '{key}': {source}")]
    Transfer {
        key: String,
        #[source]
        source: Box<ProcessError>,
    },

    /// The object store reported a failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A spawned materialization task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),

    /// The result document could not be serialized
    #[error("Failed to encode result document: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProcessError {
    pub fn transfer(key: impl Into<String>, source: Self) -> Self {
        Self::Transfer {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// True for failures that happen before any object is written
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::KeyOutsidePrefix { .. } | Self::Config(_)
        )
    }
}

/// Result type for materialization operations
pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_are_encode_failures() {
        let err: ProcessError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(matches!(err, ProcessError::Encode(_)));
        assert!(err.to_string().starts_with("Failed to encode result document"));
        assert!(!err.is_validation());
    }
}
