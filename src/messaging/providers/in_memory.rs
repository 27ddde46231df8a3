//! # In-Memory Message Source
//!
//! Broker stand-in for tests and local runs.
//!
//! ## Features
//!
//! - **FIFO**: Deliveries leave in publish order; requeued messages go to the back
//! - **Prefetch**: No more than `prefetch` deliveries are unsettled at once
//! - **Delivery counting**: Each redelivery increments the message's count
//! - **Settlement journal**: Every ack/reject/requeue is recorded for assertions
//! - **Failure injection**: The next N settlements can be made to fail
//!
//! ## Usage
//!
//! ```rust
//! use futures::StreamExt;
//! use ingest_core::messaging::{AckDecision, InMemoryMessageSource, MessageSource};
//!
//! # tokio_test::block_on(async {
//! let source = InMemoryMessageSource::new();
//! source.publish_notification(&b"{}"[..]).await;
//!
//! let mut deliveries = source.subscribe().await.unwrap();
//! let message = deliveries.next().await.unwrap().unwrap();
//! message.requeue().await.unwrap();
//!
//! let redelivered = deliveries.next().await.unwrap().unwrap();
//! assert!(redelivered.redelivered);
//! redelivered.ack().await.unwrap();
//!
//! let decisions: Vec<_> = source.settlements().await.iter().map(|s| s.decision).collect();
//! assert_eq!(decisions, vec![AckDecision::Requeue, AckDecision::Ack]);
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Mutex, Notify};

use crate::constants::broker::TRANSFER_ROUTING_KEY;
use crate::messaging::errors::MessagingError;
use crate::messaging::traits::MessageSource;
use crate::messaging::types::{AckDecision, DeliveryId, DeliveryStream, InboundMessage, MessageAcker};

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    body: Bytes,
    deliveries: u32,
}

/// One recorded settlement
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRecord {
    pub delivery_id: DeliveryId,
    pub routing_key: String,
    pub body: Bytes,
    pub decision: AckDecision,
    /// Delivery attempt this settlement ended
    pub delivery_count: u32,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SourceState {
    ready: VecDeque<StoredMessage>,
    unsettled: HashMap<u64, StoredMessage>,
    journal: Vec<SettlementRecord>,
    next_tag: u64,
    max_unsettled_observed: usize,
    failing_settlements: usize,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SourceState>,
    changed: Notify,
    prefetch: usize,
}

impl Shared {
    fn notify(&self) {
        self.changed.notify_waiters();
    }
}

/// In-memory [`MessageSource`]
#[derive(Debug, Clone)]
pub struct InMemoryMessageSource {
    shared: Arc<Shared>,
}

impl Default for InMemoryMessageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageSource {
    /// Source with an unbounded prefetch window
    pub fn new() -> Self {
        Self::with_prefetch(usize::MAX)
    }

    /// Source that hands out at most `prefetch` unsettled deliveries (minimum 1)
    pub fn with_prefetch(prefetch: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SourceState {
                    next_tag: 1,
                    ..Default::default()
                }),
                changed: Notify::new(),
                prefetch: prefetch.max(1),
            }),
        }
    }

    /// Enqueue a message with an explicit routing key
    pub async fn publish(&self, routing_key: impl Into<String>, body: impl Into<Bytes>) {
        let mut state = self.shared.state.lock().await;
        state.ready.push_back(StoredMessage {
            routing_key: routing_key.into(),
            body: body.into(),
            deliveries: 0,
        });
        drop(state);
        self.shared.notify();
    }

    /// Enqueue a message under the transfer routing key
    pub async fn publish_notification(&self, body: impl Into<Bytes>) {
        self.publish(TRANSFER_ROUTING_KEY, body).await;
    }

    /// Make the next `count` settlements fail with a settlement error
    ///
    /// A failed settlement leaves the delivery unsettled, as a broker would
    /// after a lost channel.
    pub async fn fail_next_settlements(&self, count: usize) {
        self.shared.state.lock().await.failing_settlements = count;
    }

    pub async fn settlements(&self) -> Vec<SettlementRecord> {
        self.shared.state.lock().await.journal.clone()
    }

    /// Messages waiting for delivery
    pub async fn ready_count(&self) -> usize {
        self.shared.state.lock().await.ready.len()
    }

    /// Deliveries handed out and not yet settled
    pub async fn unsettled_count(&self) -> usize {
        self.shared.state.lock().await.unsettled.len()
    }

    /// Highest number of simultaneously unsettled deliveries seen so far
    pub async fn max_unsettled_observed(&self) -> usize {
        self.shared.state.lock().await.max_unsettled_observed
    }

    /// Wait until at least `count` settlements were journaled
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_settlements(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.changed.notified();
                if self.shared.state.lock().await.journal.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    async fn next_delivery(shared: &Arc<Shared>) -> Option<InboundMessage> {
        loop {
            let notified = shared.changed.notified();
            {
                let mut state = shared.state.lock().await;
                if state.closed {
                    return None;
                }
                if state.unsettled.len() < shared.prefetch {
                    if let Some(mut message) = state.ready.pop_front() {
                        message.deliveries += 1;
                        let tag = state.next_tag;
                        state.next_tag += 1;
                        state.unsettled.insert(tag, message.clone());
                        let unsettled = state.unsettled.len();
                        if unsettled > state.max_unsettled_observed {
                            state.max_unsettled_observed = unsettled;
                        }

                        let acker = InMemoryAcker {
                            shared: shared.clone(),
                            tag,
                        };
                        return Some(
                            InboundMessage::new(
                                DeliveryId::from(tag),
                                message.routing_key,
                                message.body,
                                Box::new(acker),
                            )
                            .with_redelivery(message.deliveries > 1, Some(message.deliveries)),
                        );
                    }
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MessageSource for InMemoryMessageSource {
    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError> {
        if self.shared.state.lock().await.closed {
            return Err(MessagingError::Closed);
        }

        let shared = self.shared.clone();
        Ok(futures::stream::unfold(shared, |shared| async move {
            let message = Self::next_delivery(&shared).await?;
            Some((Ok(message), shared))
        })
        .boxed())
    }

    /// Ends every subscription and returns unsettled deliveries to the queue
    async fn close(&self) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock().await;
        state.closed = true;
        let mut returned: Vec<(u64, StoredMessage)> = state.unsettled.drain().collect();
        returned.sort_by_key(|(tag, _)| *tag);
        for (_, message) in returned.into_iter().rev() {
            state.ready.push_front(message);
        }
        drop(state);
        self.shared.notify();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(!self.shared.state.lock().await.closed)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

struct InMemoryAcker {
    shared: Arc<Shared>,
    tag: u64,
}

#[async_trait]
impl MessageAcker for InMemoryAcker {
    async fn settle(&self, decision: AckDecision) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock().await;

        if state.failing_settlements > 0 {
            state.failing_settlements -= 1;
            return Err(MessagingError::settlement(
                self.tag.to_string(),
                decision,
                "injected settlement failure",
            ));
        }

        let message = state
            .unsettled
            .remove(&self.tag)
            .ok_or_else(|| MessagingError::already_settled(self.tag.to_string()))?;

        state.journal.push(SettlementRecord {
            delivery_id: DeliveryId::from(self.tag),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            decision,
            delivery_count: message.deliveries,
            settled_at: Utc::now(),
        });

        if decision.requeues() {
            state.ready.push_back(message);
        }

        drop(state);
        self.shared.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_delivery_and_ack() {
        let source = InMemoryMessageSource::new();
        source.publish_notification("first").await;
        source.publish_notification("second").await;

        let mut stream = source.subscribe().await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();

        assert_eq!(first.body, Bytes::from("first"));
        assert_eq!(second.body, Bytes::from("second"));
        assert_eq!(first.routing_key, TRANSFER_ROUTING_KEY);
        assert_eq!(first.delivery_count, Some(1));
        assert!(!first.redelivered);

        first.ack().await.unwrap();
        second.reject().await.unwrap();

        let journal = source.settlements().await;
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].decision, AckDecision::Ack);
        assert_eq!(journal[1].decision, AckDecision::Reject);
        assert_eq!(source.ready_count().await, 0);
        assert_eq!(source.unsettled_count().await, 0);
    }

    #[tokio::test]
    async fn test_requeue_redelivers_with_incremented_count() {
        let source = InMemoryMessageSource::new();
        source.publish_notification("payload").await;

        let mut stream = source.subscribe().await.unwrap();
        stream.next().await.unwrap().unwrap().requeue().await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered);
        assert_eq!(again.delivery_count, Some(2));
        assert_eq!(again.body, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_prefetch_window_blocks_until_settlement() {
        let source = InMemoryMessageSource::with_prefetch(1);
        source.publish_notification("a").await;
        source.publish_notification("b").await;

        let mut stream = source.subscribe().await.unwrap();
        let first = stream.next().await.unwrap().unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "second delivery must wait for the first settlement");

        first.ack().await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.body, Bytes::from("b"));
        assert_eq!(source.max_unsettled_observed().await, 1);
    }

    #[tokio::test]
    async fn test_injected_settlement_failure_leaves_delivery_unsettled() {
        let source = InMemoryMessageSource::new();
        source.publish_notification("x").await;
        source.fail_next_settlements(1).await;

        let mut stream = source.subscribe().await.unwrap();
        let message = stream.next().await.unwrap().unwrap();
        let err = message.ack().await.unwrap_err();

        assert!(matches!(err, MessagingError::Settlement { .. }));
        assert_eq!(source.unsettled_count().await, 1);
        assert!(source.settlements().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_stream_and_returns_unsettled() {
        let source = InMemoryMessageSource::new();
        source.publish_notification("held").await;

        let mut stream = source.subscribe().await.unwrap();
        let _held = stream.next().await.unwrap().unwrap();

        source.close().await.unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(source.ready_count().await, 1);
        assert!(matches!(source.subscribe().await, Err(MessagingError::Closed)));
    }
}
