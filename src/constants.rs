//! # System Constants
//!
//! Wire-level literals and operational defaults shared by the ingestion pipeline.
//!
//! The broker and envelope values mirror what the blob store's notification
//! topic emits; changing them breaks compatibility with already-provisioned
//! exchanges and queues.

/// Broker binding defaults
pub mod broker {
    /// Routing key the notification topic publishes object-created events under
    pub const TRANSFER_ROUTING_KEY: &str = "bucket.transfer-notifier";

    /// Default topic exchange name
    pub const DEFAULT_EXCHANGE: &str = "bucket-notifications";

    /// Default durable queue name (bound with the transfer routing key)
    pub const DEFAULT_QUEUE: &str = "bucket.transfer-notifier";

    /// Default prefetch limit; one in-flight message per consumer
    pub const DEFAULT_PREFETCH_COUNT: u16 = 1;

    /// Default AMQP consumer tag
    pub const DEFAULT_CONSUMER_TAG: &str = "ingest-consumer";

    /// Header set by quorum queues carrying the number of prior deliveries
    pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";
}

/// Notification envelope literals
pub mod envelope {
    /// Accepted values of a record's `eventVersion`
    pub const ACCEPTED_EVENT_VERSIONS: &[&str] = &["2.0", "2.2"];

    /// Only accepted value of `s3.s3SchemaVersion`
    pub const S3_SCHEMA_VERSION: &str = "1.0";
}

/// Object transfer defaults
pub mod transfer {
    /// Fixed write chunk size for streaming downloads (32 KiB)
    pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 32 * 1024;

    /// Upper bound accepted by configuration validation (16 MiB)
    pub const MAX_CHUNK_SIZE_BYTES: usize = 16 * 1024 * 1024;

    /// Prefix of per-message scratch directories
    pub const SCRATCH_DIR_PREFIX: &str = "ingest-";

    /// File name used when an object key has no usable final segment
    pub const FALLBACK_FILE_NAME: &str = "object.bin";
}

/// Conversion runner defaults
pub mod conversion {
    /// Default converter program
    pub const DEFAULT_PROGRAM: &str = "python3";

    /// Default hard deadline for one conversion (one hour)
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

    /// Exit code reported for children terminated by a signal
    pub const SIGNALLED_EXIT_CODE: i32 = -1;
}

/// Consumer policy defaults
pub mod consumer {
    /// Conversion failures of one object tolerated before the message is rejected
    pub const DEFAULT_MAX_CONVERSION_ATTEMPTS: u32 = 5;

    /// Broker deliveries of one message before it is rejected; `0` disables the limit
    pub const DEFAULT_MAX_DELIVERIES: u32 = 0;

    /// Deadline for each record-keeping API call
    pub const DEFAULT_RECORD_KEEPING_TIMEOUT_SECONDS: u64 = 30;
}
