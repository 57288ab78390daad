/// Error types for the thumbnail service
///
/// Every error that reaches the batch driver is reported back to the queue as
/// a failed message. Retry counts and dead-lettering are owned by the queue.
use s3_utils::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Result type for thumbnail-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Message body is not a notification envelope we can read
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Source object could not be fetched
    #[error("Failed to fetch {bucket}/{key}: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    /// Source object was fetched but carried no payload
    #[error("Source object {bucket}/{key} has no payload")]
    EmptyObject { bucket: String, key: String },

    /// Image decode, resize or encode failed
    #[error("Image processing failed: {0}")]
    Processing(String),

    /// Derived object could not be written
    #[error("Failed to write {bucket}/{key}: {source}")]
    Write {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    /// A fail-fast batch stopped at its first failed message
    #[error("Batch aborted at message {message_id}: {reason}")]
    BatchAborted { message_id: String, reason: String },

    /// Queue receive/acknowledge failed
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure category reported per message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Malformed,
    Fetch,
    Processing,
    Write,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::MalformedMessage(_) => FailureKind::Malformed,
            AppError::Fetch { .. } | AppError::EmptyObject { .. } => FailureKind::Fetch,
            AppError::Processing(_) => FailureKind::Processing,
            AppError::Write { .. } => FailureKind::Write,
            AppError::BatchAborted { .. }
            | AppError::Queue(_)
            | AppError::Config(_)
            | AppError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether redelivery can plausibly succeed without someone fixing the
    /// input first. Only used to pick the log level; every failure is still
    /// handed back to the queue.
    pub fn likely_transient(&self) -> bool {
        match self {
            AppError::Fetch { source, .. } | AppError::Write { source, .. } => {
                source.is_transient()
            }
            AppError::MalformedMessage(_) | AppError::Processing(_) => false,
            _ => true,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedMessage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            AppError::MalformedMessage("x".into()).kind(),
            FailureKind::Malformed
        );
        assert_eq!(
            AppError::EmptyObject {
                bucket: "b".into(),
                key: "k".into()
            }
            .kind(),
            FailureKind::Fetch
        );
        assert_eq!(
            AppError::Write {
                bucket: "b".into(),
                key: "k".into(),
                source: StorageError::Request("503".into()),
            }
            .kind(),
            FailureKind::Write
        );
    }

    #[test]
    fn test_json_errors_are_malformed_messages() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::MalformedMessage(_)));
        assert!(!err.likely_transient());
    }
}
