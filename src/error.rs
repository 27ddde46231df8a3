//! # Error Types
//!
//! [`IngestError`] unifies the per-module errors so the consumer can turn any
//! failure into an acknowledgment decision in one place.
//!
//! Permanent errors are defects in the message itself; retrying cannot fix
//! them. Everything else is treated as transient.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::conversion::ConversionError;
use crate::events::EnvelopeError;
use crate::messaging::MessagingError;
use crate::record_keeping::RecordKeepingError;
use crate::transfer::TransferError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unexpected routing key '{actual}' (expected '{expected}')")]
    RoutingKeyMismatch { expected: String, actual: String },

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Giving up on {identity} after {attempts} failed conversions: {last_error}")]
    ConversionAttemptsExhausted {
        identity: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Giving up after {deliveries} deliveries (limit {limit}): {last_error}")]
    DeliveryLimitReached {
        deliveries: u32,
        limit: u32,
        last_error: String,
    },

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    RecordKeeping(#[from] RecordKeepingError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl IngestError {
    pub fn routing_key_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::RoutingKeyMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn attempts_exhausted(
        identity: impl Into<String>,
        attempts: u32,
        last_error: impl ToString,
    ) -> Self {
        Self::ConversionAttemptsExhausted {
            identity: identity.into(),
            attempts,
            last_error: last_error.to_string(),
        }
    }

    pub fn delivery_limit_reached(deliveries: u32, limit: u32, last_error: impl ToString) -> Self {
        Self::DeliveryLimitReached {
            deliveries,
            limit,
            last_error: last_error.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether redelivering the same message can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::RoutingKeyMismatch { .. }
                | Self::Envelope(_)
                | Self::ConversionAttemptsExhausted { .. }
                | Self::DeliveryLimitReached { .. }
        )
    }

    /// Short stable label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoutingKeyMismatch { .. } => "routing_key_mismatch",
            Self::Envelope(EnvelopeError::MalformedEnvelope { .. }) => "malformed_envelope",
            Self::Envelope(EnvelopeError::UnexpectedRecordCount { .. }) => {
                "unexpected_record_count"
            }
            Self::Transfer(TransferError::ObjectNotFound { .. }) => "object_not_found",
            Self::Transfer(_) => "transfer_io",
            Self::Conversion(ConversionError::TimedOut { .. }) => "conversion_timed_out",
            Self::Conversion(_) => "conversion_failed",
            Self::ConversionAttemptsExhausted { .. } => "conversion_attempts_exhausted",
            Self::DeliveryLimitReached { .. } => "delivery_limit_reached",
            Self::Messaging(_) => "messaging",
            Self::RecordKeeping(_) => "record_keeping",
            Self::Configuration(_) => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(IngestError::routing_key_mismatch("a", "b").is_permanent());
        assert!(IngestError::from(EnvelopeError::unexpected_record_count(2)).is_permanent());
        assert!(IngestError::from(EnvelopeError::malformed("bad json")).is_permanent());
        assert!(IngestError::attempts_exhausted("b/k@e", 5, "boom").is_permanent());
        assert!(IngestError::delivery_limit_reached(10, 10, "not found").is_permanent());

        assert!(!IngestError::from(TransferError::object_not_found("b", "k")).is_permanent());
        assert!(!IngestError::from(TransferError::io("read_stream", "reset")).is_permanent());
        assert!(!IngestError::from(ConversionError::timed_out(10_000)).is_permanent());
        assert!(!IngestError::from(RecordKeepingError::timed_out("start", 100)).is_permanent());
        assert!(!IngestError::internal("task panicked").is_permanent());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            IngestError::from(TransferError::object_not_found("b", "k")).kind(),
            "object_not_found"
        );
        assert_eq!(
            IngestError::from(ConversionError::conversion_failed(2, vec![], String::new())).kind(),
            "conversion_failed"
        );
    }
}
