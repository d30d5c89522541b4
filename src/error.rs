//! Error types for dicom-event

use thiserror::Error;

/// Errors that can occur in the event system
#[derive(Debug, Error)]
pub enum EventError {
    /// Provider connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Network failure, timeout or server-side error; may succeed on retry
    #[error("Transient delivery failure to '{destination}': {reason}")]
    Transient {
        destination: String,
        reason: String,
    },

    /// Destination explicitly refused the event; never retried
    #[error("Delivery to '{destination}' rejected (status {status}): {reason}")]
    Rejected {
        destination: String,
        status: u16,
        reason: String,
    },

    /// Malformed provider or manager configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed event handed to `publish` by the caller
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local I/O failure (file log)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Provider was used after `close()`
    #[error("Provider closed: {0}")]
    Closed(String),
}

impl EventError {
    /// Whether a retry of the same delivery may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventError::Transient { .. } | EventError::Timeout(_) | EventError::Connection(_)
        )
    }
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = EventError::Transient {
            destination: "http://hook".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert!(transient.is_retryable());
        assert!(EventError::Timeout("attempt 1".to_string()).is_retryable());

        let rejected = EventError::Rejected {
            destination: "http://hook".to_string(),
            status: 404,
            reason: "not found".to_string(),
        };
        assert!(!rejected.is_retryable());
        assert!(!EventError::InvalidEvent("empty subject".to_string()).is_retryable());
        assert!(!EventError::Closed("memory".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = EventError::Rejected {
            destination: "http://hook".to_string(),
            status: 410,
            reason: "gone".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Delivery to 'http://hook' rejected (status 410): gone"
        );
    }
}
