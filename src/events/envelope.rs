//! # Notification Envelope Model
//!
//! Typed representation of the object-created notification the blob store
//! publishes to the broker. Pure data plus validation: no I/O happens here.
//!
//! ## Wire Format
//!
//! ```text
//! {"Records": [{
//!     "eventVersion": "2.2",
//!     "eventTime": "2024-03-01T12:00:00.000Z",
//!     "eventName": "ObjectCreated:Put",
//!     "userIdentity": {"principalId": "alice"},
//!     "s3": {
//!         "s3SchemaVersion": "1.0",
//!         "configurationId": "transfer-notifier",
//!         "bucket": {"name": "alice", "ownerIdentity": {"principalId": "alice"}},
//!         "object": {"key": "run1/events.root", "size": 1024, "eTag": "...", "sequencer": "..."}
//!     }
//! }]}
//! ```
//!
//! Unknown fields (`awsRegion`, `requestParameters`, ...) are ignored. Missing
//! required fields, wrong field types and unknown version literals all fail with
//! [`EnvelopeError::MalformedEnvelope`]; no partially-populated envelope is ever
//! returned.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::error::EnvelopeError;

/// Accepted `eventVersion` literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventVersion {
    #[serde(rename = "2.0")]
    V2_0,
    #[serde(rename = "2.2")]
    V2_2,
}

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventVersion::V2_0 => write!(f, "2.0"),
            EventVersion::V2_2 => write!(f, "2.2"),
        }
    }
}

/// Accepted `s3SchemaVersion` literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[serde(rename = "1.0")]
    V1_0,
}

/// Top-level message body: an ordered sequence of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Records")]
    pub records: Vec<Record>,
}

/// One object-level event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRecord", into = "WireRecord")]
pub struct Record {
    pub event_version: EventVersion,
    /// Event timestamp with the producer's original UTC offset preserved
    pub event_time: DateTime<FixedOffset>,
    pub event_name: String,
    /// Principal that owns the event
    pub actor: String,
    pub schema_version: SchemaVersion,
    /// Name of the bucket notification configuration that fired
    pub configuration_id: String,
    pub location: ObjectLocation,
}

/// Where the object lives and what the store reported about it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket_name: String,
    pub bucket_owner: String,
    pub object_key: String,
    /// Size declared by the producer; advisory only
    pub size: u64,
    /// Entity tag of the stored object
    pub content_hash: String,
    /// Ordering hint from the store, for diagnostics only
    pub sequence_token: String,
}

impl ObjectLocation {
    /// Stable identity of one stored object version: `bucket/key@etag`
    pub fn identity(&self) -> String {
        format!(
            "{}/{}@{}",
            self.bucket_name, self.object_key, self.content_hash
        )
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket_name, self.object_key)
    }
}

impl Record {
    /// Whether the event name describes an object creation (`ObjectCreated:*`)
    pub fn is_object_created(&self) -> bool {
        self.event_name
            .trim_start_matches("s3:")
            .starts_with("ObjectCreated")
    }
}

impl NotificationEnvelope {
    /// Wrap a single record, the only shape the pipeline processes
    pub fn single(record: Record) -> Self {
        Self {
            records: vec![record],
        }
    }

    /// Encode to the wire representation
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::from)
    }
}

/// Deserialize and structurally validate one message body
pub fn parse(bytes: &[u8]) -> Result<NotificationEnvelope, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(EnvelopeError::from)
}

/// Extract the only record of an envelope
///
/// Batched envelopes are a producer contract violation and are never split.
pub fn single_record(envelope: NotificationEnvelope) -> Result<Record, EnvelopeError> {
    let mut records = envelope.records;
    if records.len() != 1 {
        return Err(EnvelopeError::unexpected_record_count(records.len()));
    }
    records
        .pop()
        .ok_or_else(|| EnvelopeError::unexpected_record_count(0))
}

// Wire shapes. Kept private so the public model stays flat.

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    #[serde(rename = "eventVersion")]
    event_version: EventVersion,
    #[serde(rename = "eventTime")]
    event_time: DateTime<FixedOffset>,
    #[serde(rename = "eventName")]
    event_name: String,
    #[serde(rename = "userIdentity")]
    user_identity: WireIdentity,
    s3: WireS3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireIdentity {
    #[serde(rename = "principalId")]
    principal_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireS3 {
    #[serde(rename = "s3SchemaVersion")]
    schema_version: SchemaVersion,
    #[serde(rename = "configurationId")]
    configuration_id: String,
    bucket: WireBucket,
    object: WireObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireBucket {
    name: String,
    #[serde(rename = "ownerIdentity")]
    owner_identity: WireIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireObject {
    key: String,
    size: u64,
    #[serde(rename = "eTag")]
    e_tag: String,
    sequencer: String,
}

impl From<WireRecord> for Record {
    fn from(wire: WireRecord) -> Self {
        Self {
            event_version: wire.event_version,
            event_time: wire.event_time,
            event_name: wire.event_name,
            actor: wire.user_identity.principal_id,
            schema_version: wire.s3.schema_version,
            configuration_id: wire.s3.configuration_id,
            location: ObjectLocation {
                bucket_name: wire.s3.bucket.name,
                bucket_owner: wire.s3.bucket.owner_identity.principal_id,
                object_key: wire.s3.object.key,
                size: wire.s3.object.size,
                content_hash: wire.s3.object.e_tag,
                sequence_token: wire.s3.object.sequencer,
            },
        }
    }
}

impl From<Record> for WireRecord {
    fn from(record: Record) -> Self {
        Self {
            event_version: record.event_version,
            event_time: record.event_time,
            event_name: record.event_name,
            user_identity: WireIdentity {
                principal_id: record.actor,
            },
            s3: WireS3 {
                schema_version: record.schema_version,
                configuration_id: record.configuration_id,
                bucket: WireBucket {
                    name: record.location.bucket_name,
                    owner_identity: WireIdentity {
                        principal_id: record.location.bucket_owner,
                    },
                },
                object: WireObject {
                    key: record.location.object_key,
                    size: record.location.size,
                    e_tag: record.location.content_hash,
                    sequencer: record.location.sequence_token,
                },
            },
        }
    }
}
