//! # Messaging
//!
//! Broker subscription for bucket notifications.
//!
//! The consumer only depends on [`MessageSource`]; the RabbitMQ provider is
//! used in deployment and the in-memory provider in tests and local runs.

pub mod errors;
pub mod providers;
pub mod traits;
pub mod types;

pub use errors::MessagingError;
pub use providers::{InMemoryMessageSource, RabbitMqMessageSource, SettlementRecord};
pub use traits::MessageSource;
pub use types::{AckDecision, DeliveryId, DeliveryStream, InboundMessage, MessageAcker};
