//! # Ingestion Consumer
//!
//! Owns the subscription and decides, for each delivery, whether to ack,
//! reject or requeue it.

#[allow(clippy::module_inception)]
pub mod consumer;
pub mod disposition;
pub mod pipeline;
pub mod redelivery;
pub mod state;

pub use consumer::{ConsumerSummary, IngestionConsumer};
pub use disposition::{decide, Disposition};
pub use pipeline::{MessagePipeline, ProcessingReport};
pub use redelivery::RedeliveryTracker;
pub use state::MessageStage;
