use chrono::{DateTime, FixedOffset, TimeZone};
use proptest::prelude::*;

use ingest_core::events::{EventVersion, ObjectLocation, Record, SchemaVersion};

/// Strategy for bucket names as the store allows them
pub fn bucket_name_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9.-]{2,62}"
}

/// Strategy for object keys, including nested prefixes and unicode
pub fn object_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_.-]{1,40}",
        "[a-z0-9]{1,10}/[a-z0-9]{1,10}/[a-zA-Z0-9_.-]{1,20}",
        "[a-z]{1,8}/données [0-9]{1,4}\\.root",
    ]
}

/// Strategy for event timestamps with arbitrary whole-minute offsets and millisecond precision
pub fn event_time_strategy() -> impl Strategy<Value = DateTime<FixedOffset>> {
    (
        0i64..4_102_444_800, // up to 2100-01-01
        0u32..1000,
        -(14 * 60)..=(14 * 60),
    )
        .prop_map(|(secs, millis, offset_minutes)| {
            let offset = FixedOffset::east_opt(offset_minutes * 60)
                .unwrap_or_else(|| FixedOffset::east_opt(0).expect("UTC offset"));
            offset
                .timestamp_opt(secs, millis * 1_000_000)
                .single()
                .expect("unambiguous timestamp")
        })
}

pub fn event_version_strategy() -> impl Strategy<Value = EventVersion> {
    prop_oneof![Just(EventVersion::V2_0), Just(EventVersion::V2_2)]
}

/// Strategy for fully valid records
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        event_version_strategy(),
        event_time_strategy(),
        prop_oneof![
            Just("ObjectCreated:Put".to_string()),
            Just("ObjectCreated:CompleteMultipartUpload".to_string()),
            Just("s3:ObjectCreated:Copy".to_string()),
        ],
        bucket_name_strategy(),
        object_key_strategy(),
        any::<u64>(),
        "[0-9a-f]{32}",
        "[0-9A-F]{16}",
    )
        .prop_map(
            |(event_version, event_time, event_name, bucket, key, size, etag, sequencer)| Record {
                event_version,
                event_time,
                event_name,
                actor: bucket.clone(),
                schema_version: SchemaVersion::V1_0,
                configuration_id: "transfer-notifier".to_string(),
                location: ObjectLocation {
                    bucket_owner: bucket.clone(),
                    bucket_name: bucket,
                    object_key: key,
                    size,
                    content_hash: etag,
                    sequence_token: sequencer,
                },
            },
        )
}
