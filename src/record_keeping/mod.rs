//! # Record Keeping
//!
//! Notifies an external API when a conversion starts and when it ends.
//!
//! The consumer calls [`RecordKeeper::conversion_started`] before the object is
//! transferred and [`RecordKeeper::conversion_finished`] once the converter has
//! exited, whatever its outcome. Both calls are bounded by the consumer's
//! record-keeping timeout.

pub mod error;
pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::events::Record;

pub use error::RecordKeepingError;
pub use http::HttpRecordKeeper;
pub use memory::{InMemoryRecordKeeper, RecordKeepingCall};

/// Object coordinates sent with both calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSubject {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub event_time: DateTime<FixedOffset>,
}

impl From<&Record> for ConversionSubject {
    fn from(record: &Record) -> Self {
        Self {
            bucket: record.location.bucket_name.clone(),
            key: record.location.object_key.clone(),
            size: record.location.size,
            etag: record.location.content_hash.clone(),
            event_time: record.event_time,
        }
    }
}

/// How a conversion ended, as reported to the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub succeeded: bool,
    /// `None` when the converter never produced an exit status (spawn failure, timeout)
    pub exit_code: Option<i32>,
    pub units: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn success(exit_code: i32, units: usize, duration: Duration) -> Self {
        Self {
            succeeded: true,
            exit_code: Some(exit_code),
            units,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    pub fn failure(exit_code: Option<i32>, duration: Duration, error: impl ToString) -> Self {
        Self {
            succeeded: false,
            exit_code,
            units: 0,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

#[async_trait]
pub trait RecordKeeper: Send + Sync + 'static {
    /// Register the object and mark its conversion as started
    async fn conversion_started(&self, subject: &ConversionSubject) -> Result<(), RecordKeepingError>;

    /// Declare the conversion finished
    async fn conversion_finished(
        &self,
        subject: &ConversionSubject,
        result: &ConversionResult,
    ) -> Result<(), RecordKeepingError>;

    fn name(&self) -> &'static str;
}

/// Record keeper that accepts every call without doing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecordKeeper;

#[async_trait]
impl RecordKeeper for NoopRecordKeeper {
    async fn conversion_started(&self, _subject: &ConversionSubject) -> Result<(), RecordKeepingError> {
        Ok(())
    }

    async fn conversion_finished(
        &self,
        _subject: &ConversionSubject,
        _result: &ConversionResult,
    ) -> Result<(), RecordKeepingError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
