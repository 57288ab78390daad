//! Error types for object storage access

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors returned by [`crate::ObjectStorage`] implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No object exists at the given location
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The caller is not allowed to read or write the object
    #[error("Access denied: {bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    /// The request failed in transit or was rejected by the service
    #[error("Storage request failed: {0}")]
    Request(String),

    /// The response body could not be read
    #[error("Failed to read object body: {0}")]
    Body(String),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn access_denied(bucket: &str, key: &str) -> Self {
        StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Not-found and access errors usually need operator action; request and
    /// body errors are typically transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Request(_) | StorageError::Body(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        let err = StorageError::not_found("images-bucket", "photos/cat.png");
        assert_eq!(err.to_string(), "Object not found: images-bucket/photos/cat.png");
    }

    #[test]
    fn test_is_transient() {
        assert!(StorageError::Request("timeout".into()).is_transient());
        assert!(!StorageError::access_denied("b", "k").is_transient());
    }
}
