//! # Message Source Trait
//!
//! Provider-agnostic subscription to the notification queue.

use async_trait::async_trait;

use super::errors::MessagingError;
use super::types::DeliveryStream;

/// A queue the consumer can subscribe to
///
/// Implementations must honor the broker's prefetch window: a delivery is not
/// handed out beyond the configured number of unsettled messages. Closing the
/// source returns every unsettled delivery to the queue.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Start receiving deliveries
    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError>;

    /// Stop receiving and release the connection
    ///
    /// Deliveries already handed out may still be settled until this returns.
    async fn close(&self) -> Result<(), MessagingError>;

    /// Check the underlying connection
    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
