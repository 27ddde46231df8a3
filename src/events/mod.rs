//! # Event Envelope Model
//!
//! Decoding and structural validation of blob-store notifications.

pub mod envelope;
pub mod error;

pub use envelope::{
    parse, single_record, EventVersion, NotificationEnvelope, ObjectLocation, Record,
    SchemaVersion,
};
pub use error::EnvelopeError;
