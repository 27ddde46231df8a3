//! Test data builders for notifications, stored objects and converter scripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::DateTime;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use ingest_core::conversion::ConversionRunner;
use ingest_core::events::{EventVersion, NotificationEnvelope, ObjectLocation, Record, SchemaVersion};

/// Builder for a single object-created record
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    bucket: String,
    key: String,
    size: u64,
    etag: String,
    event_name: String,
    event_time: String,
}

impl RecordBuilder {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: 0,
            etag: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            event_name: "ObjectCreated:Put".to_string(),
            event_time: "2024-03-01T12:00:00.000Z".to_string(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = etag.to_string();
        self
    }

    pub fn with_event_name(mut self, event_name: &str) -> Self {
        self.event_name = event_name.to_string();
        self
    }

    pub fn build(self) -> Record {
        Record {
            event_version: EventVersion::V2_2,
            event_time: DateTime::parse_from_rfc3339(&self.event_time)
                .expect("valid test timestamp"),
            event_name: self.event_name,
            actor: self.bucket.clone(),
            schema_version: SchemaVersion::V1_0,
            configuration_id: "transfer-notifier".to_string(),
            location: ObjectLocation {
                bucket_owner: self.bucket.clone(),
                bucket_name: self.bucket,
                object_key: self.key,
                size: self.size,
                content_hash: self.etag,
                sequence_token: "0000000000000001".to_string(),
            },
        }
    }

    /// Encoded single-record envelope
    pub fn notification(self) -> Vec<u8> {
        NotificationEnvelope::single(self.build())
            .to_bytes()
            .expect("envelope encodes")
    }
}

/// Envelope carrying every given record
pub fn batched_notification(records: Vec<Record>) -> Vec<u8> {
    NotificationEnvelope { records }
        .to_bytes()
        .expect("envelope encodes")
}

/// Store `data` where `SharedStoreConnector` looks for `bucket/key`
pub async fn put_object(store: &Arc<InMemory>, bucket: &str, key: &str, data: impl Into<Bytes>) {
    store
        .put(&ObjectPath::from(format!("{bucket}/{key}")), data.into().into())
        .await
        .expect("object stored");
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write a `/bin/sh` script into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script written");
    path
}

/// Runner executing `script` through `/bin/sh`; the working file arrives as `$1`
pub fn sh_runner(script: &Path) -> ConversionRunner {
    ConversionRunner::new("/bin/sh").with_args([script.to_string_lossy().into_owned()])
}
