//! Mapping from processing errors to acknowledgment decisions.
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | routing key mismatch | reject |
//! | malformed envelope | reject |
//! | record count other than one | reject |
//! | conversion attempts exhausted | reject |
//! | broker delivery limit reached | reject |
//! | object not found | requeue |
//! | transfer I/O | requeue |
//! | conversion failed or timed out | requeue |
//! | record keeping failure | requeue |
//! | anything else | requeue |

use crate::error::IngestError;
use crate::messaging::AckDecision;

/// Decision and the reason logged with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub decision: AckDecision,
    pub reason: String,
}

impl Disposition {
    pub fn ack() -> Self {
        Self {
            decision: AckDecision::Ack,
            reason: "converted".to_string(),
        }
    }

    pub fn for_error(error: &IngestError) -> Self {
        Self {
            decision: decide(error),
            reason: format!("{}: {}", error.kind(), error),
        }
    }
}

pub fn decide(error: &IngestError) -> AckDecision {
    if error.is_permanent() {
        AckDecision::Reject
    } else {
        AckDecision::Requeue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ConversionError;
    use crate::events::EnvelopeError;
    use crate::record_keeping::RecordKeepingError;
    use crate::transfer::TransferError;

    #[test]
    fn test_decision_table() {
        let cases: Vec<(IngestError, AckDecision)> = vec![
            (
                IngestError::routing_key_mismatch("bucket.transfer-notifier", "other"),
                AckDecision::Reject,
            ),
            (EnvelopeError::malformed("eof").into(), AckDecision::Reject),
            (EnvelopeError::unexpected_record_count(0).into(), AckDecision::Reject),
            (
                IngestError::attempts_exhausted("b/k@e", 5, "exit 1"),
                AckDecision::Reject,
            ),
            (
                IngestError::delivery_limit_reached(20, 20, "object not found"),
                AckDecision::Reject,
            ),
            (
                TransferError::object_not_found("b", "k").into(),
                AckDecision::Requeue,
            ),
            (
                TransferError::io("read_stream", "connection reset").into(),
                AckDecision::Requeue,
            ),
            (
                ConversionError::conversion_failed(1, vec![], "oops".to_string()).into(),
                AckDecision::Requeue,
            ),
            (ConversionError::timed_out(3_600_000).into(), AckDecision::Requeue),
            (
                RecordKeepingError::http_status("conversion_started", 500, "down").into(),
                AckDecision::Requeue,
            ),
            (IngestError::internal("task panicked"), AckDecision::Requeue),
        ];

        for (error, expected) in cases {
            assert_eq!(decide(&error), expected, "wrong decision for {error}");
        }
    }

    #[test]
    fn test_reason_carries_kind() {
        let disposition = Disposition::for_error(&TransferError::object_not_found("b", "k").into());
        assert_eq!(disposition.decision, AckDecision::Requeue);
        assert_eq!(disposition.reason, "object_not_found: Object not found: b/k");
    }
}
