//! # Envelope Error Types
//!
//! Both variants describe producer-side defects. Redelivering the same bytes can
//! never succeed, so the consumer settles them with reject-without-requeue.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Unexpected record count: envelope carries {count} records, expected exactly 1")]
    UnexpectedRecordCount { count: usize },
}

impl EnvelopeError {
    /// Create a malformed envelope error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Create an unexpected record count error
    pub fn unexpected_record_count(count: usize) -> Self {
        Self::UnexpectedRecordCount { count }
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}
