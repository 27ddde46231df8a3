#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, RadosGW in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Ingest Core
//!
//! Durable consumer that turns blob-store "object created" notifications into
//! converted output.
//!
//! ## Overview
//!
//! A notification arrives on a broker queue, names exactly one object, and is
//! settled only after that object has been copied into a private working file
//! and handed to an external converter program. Every message ends in exactly
//! one of three outcomes:
//!
//! - **ack**: the converter exited with status 0
//! - **reject**: the message can never succeed (malformed envelope, wrong record
//!   count, wrong routing key, or too many failed conversions)
//! - **requeue**: anything transient (missing object, I/O, converter failure,
//!   record-keeping outage)
//!
//! ## Module Organization
//!
//! - [`events`] - Notification envelope model and validation
//! - [`transfer`] - Streaming object download into a working file
//! - [`conversion`] - External converter process supervision
//! - [`consumer`] - Admission loop, per-message pipeline and ack decisions
//! - [`messaging`] - Broker subscription seam with RabbitMQ and in-memory providers
//! - [`record_keeping`] - Conversion start/finish notifications to an external API
//! - [`config`] - Configuration loading and validation
//! - [`logging`] - Tracing subscriber setup and stage logging
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ingest_core::config::ConfigLoader;
//! use ingest_core::consumer::IngestionConsumer;
//! use ingest_core::conversion::ConversionRunner;
//! use ingest_core::messaging::RabbitMqMessageSource;
//! use ingest_core::record_keeping::NoopRecordKeeper;
//! use ingest_core::transfer::{ObjectTransfer, S3Connector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_process_env().load()?;
//! let source = Arc::new(RabbitMqMessageSource::connect(&config.broker).await?);
//! let transfer = ObjectTransfer::new(Arc::new(S3Connector::new(config.blob_store.clone())));
//! let runner = ConversionRunner::from_config(&config.converter);
//!
//! let consumer = IngestionConsumer::new(
//!     &config,
//!     source,
//!     transfer,
//!     runner,
//!     Arc::new(NoopRecordKeeper),
//! );
//! let summary = consumer.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! println!("acked {} messages", summary.acked);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod consumer;
pub mod conversion;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod record_keeping;
pub mod transfer;

pub use config::{ConfigLoader, ConfigurationError, IngestConfig};
pub use consumer::{ConsumerSummary, IngestionConsumer, MessageStage, ProcessingReport};
pub use conversion::{ConversionError, ConversionOutcome, ConversionRunner};
pub use error::{IngestError, Result};
pub use events::{EnvelopeError, NotificationEnvelope, ObjectLocation, Record};
pub use messaging::{AckDecision, InboundMessage, MessageSource, MessagingError};
pub use record_keeping::{RecordKeeper, RecordKeepingError};
pub use transfer::{ObjectTransfer, TransferError, WorkingFile};
