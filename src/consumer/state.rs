//! Per-message processing stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logging::log_stage_transition;
use crate::messaging::AckDecision;

/// Where one delivery is in the pipeline
///
/// `Received → Parsed → Downloading → Converting → Acked`, with
/// `RejectedPermanent` and `Requeued` as the failure exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStage {
    Received,
    Parsed,
    Downloading,
    Converting,
    Acked,
    RejectedPermanent,
    Requeued,
}

impl MessageStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acked | Self::RejectedPermanent | Self::Requeued)
    }

    /// Terminal stage reached by settling with `decision`
    pub fn for_decision(decision: AckDecision) -> Self {
        match decision {
            AckDecision::Ack => Self::Acked,
            AckDecision::Reject => Self::RejectedPermanent,
            AckDecision::Requeue => Self::Requeued,
        }
    }
}

impl fmt::Display for MessageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Downloading => "downloading",
            Self::Converting => "converting",
            Self::Acked => "acked",
            Self::RejectedPermanent => "rejected_permanent",
            Self::Requeued => "requeued",
        };
        f.write_str(name)
    }
}

/// Current stage of one delivery, logging every transition
#[derive(Debug)]
pub(crate) struct StageCursor {
    current: MessageStage,
}

impl StageCursor {
    pub(crate) fn new() -> Self {
        Self {
            current: MessageStage::Received,
        }
    }

    pub(crate) fn current(&self) -> MessageStage {
        self.current
    }

    pub(crate) fn advance(&mut self, next: MessageStage) {
        if self.current.is_terminal() || self.current == next {
            return;
        }
        log_stage_transition(self.current, next);
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages_follow_decisions() {
        assert_eq!(MessageStage::for_decision(AckDecision::Ack), MessageStage::Acked);
        assert_eq!(
            MessageStage::for_decision(AckDecision::Reject),
            MessageStage::RejectedPermanent
        );
        assert_eq!(
            MessageStage::for_decision(AckDecision::Requeue),
            MessageStage::Requeued
        );
        assert!(MessageStage::Requeued.is_terminal());
        assert!(!MessageStage::Converting.is_terminal());
    }

    #[test]
    fn test_cursor_stops_at_terminal_stage() {
        let mut cursor = StageCursor::new();
        cursor.advance(MessageStage::Parsed);
        cursor.advance(MessageStage::Downloading);
        cursor.advance(MessageStage::Requeued);
        cursor.advance(MessageStage::Acked);
        assert_eq!(cursor.current(), MessageStage::Requeued);
    }
}
