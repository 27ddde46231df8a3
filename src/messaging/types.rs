//! # Messaging Types
//!
//! Provider-neutral delivery model. An [`InboundMessage`] owns its settlement
//! handle and every settlement method consumes the message, so a delivery is
//! acknowledged, rejected or requeued at most once.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::errors::MessagingError;

/// Provider-assigned delivery identifier (AMQP delivery tag, in-memory counter)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for DeliveryId {
    fn from(tag: u64) -> Self {
        Self(tag.to_string())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final broker-facing decision for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckDecision {
    /// Processed; remove from the queue
    Ack,
    /// Permanently unprocessable; discard (or dead-letter, per broker policy)
    Reject,
    /// Transient failure; return to the queue for redelivery
    Requeue,
}

impl AckDecision {
    pub fn requeues(&self) -> bool {
        matches!(self, Self::Requeue)
    }
}

impl fmt::Display for AckDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Reject => write!(f, "reject"),
            Self::Requeue => write!(f, "requeue"),
        }
    }
}

/// Provider hook that carries a decision back to the broker
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn settle(&self, decision: AckDecision) -> Result<(), MessagingError>;
}

/// One delivery taken from the broker
pub struct InboundMessage {
    pub delivery_id: DeliveryId,
    pub routing_key: String,
    pub body: Bytes,
    /// Broker flag: this message was delivered before and not acknowledged
    pub redelivered: bool,
    /// Deliveries so far including this one, when the provider knows it
    pub delivery_count: Option<u32>,
    pub received_at: DateTime<Utc>,
    acker: Box<dyn MessageAcker>,
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("delivery_id", &self.delivery_id)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("delivery_count", &self.delivery_count)
            .field("received_at", &self.received_at)
            .finish()
    }
}

impl InboundMessage {
    pub fn new(
        delivery_id: DeliveryId,
        routing_key: impl Into<String>,
        body: Bytes,
        acker: Box<dyn MessageAcker>,
    ) -> Self {
        Self {
            delivery_id,
            routing_key: routing_key.into(),
            body,
            redelivered: false,
            delivery_count: None,
            received_at: Utc::now(),
            acker,
        }
    }

    pub fn with_redelivery(mut self, redelivered: bool, delivery_count: Option<u32>) -> Self {
        self.redelivered = redelivered;
        self.delivery_count = delivery_count;
        self
    }

    pub async fn ack(self) -> Result<(), MessagingError> {
        self.settle(AckDecision::Ack).await
    }

    pub async fn reject(self) -> Result<(), MessagingError> {
        self.settle(AckDecision::Reject).await
    }

    pub async fn requeue(self) -> Result<(), MessagingError> {
        self.settle(AckDecision::Requeue).await
    }

    pub async fn settle(self, decision: AckDecision) -> Result<(), MessagingError> {
        self.acker.settle(decision).await
    }
}

/// Deliveries from an active subscription, in broker order
pub type DeliveryStream = BoxStream<'static, Result<InboundMessage, MessagingError>>;
