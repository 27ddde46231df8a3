//! # Message Source Providers

pub mod in_memory;
pub mod rabbitmq;

pub use in_memory::{InMemoryMessageSource, SettlementRecord};
pub use rabbitmq::RabbitMqMessageSource;
