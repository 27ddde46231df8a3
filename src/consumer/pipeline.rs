//! # Message Pipeline
//!
//! Processes one delivery end to end and settles it exactly once:
//!
//! 1. Check the routing key
//! 2. Parse the envelope and take its single record
//! 3. Tell the record keeper the conversion starts
//! 4. Download the object into a fresh working file
//! 5. Run the converter on it
//! 6. Tell the record keeper the conversion finished
//! 7. Ack, reject or requeue
//!
//! The working file is removed before settlement on every path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn, Instrument, Span};

use super::disposition::Disposition;
use super::redelivery::RedeliveryTracker;
use super::state::{MessageStage, StageCursor};
use crate::conversion::{ConversionError, ConversionOutcome, ConversionRunner, ConvertedUnit};
use crate::error::IngestError;
use crate::events::{self, Record};
use crate::logging::{log_message_settled, message_span, record_object};
use crate::messaging::{AckDecision, DeliveryId, InboundMessage, MessagingError};
use crate::record_keeping::{ConversionResult, ConversionSubject, RecordKeeper, RecordKeepingError};
use crate::transfer::{ObjectTransfer, WorkingFile};

/// What happened to one delivery
#[derive(Debug)]
pub struct ProcessingReport {
    pub delivery_id: DeliveryId,
    pub decision: AckDecision,
    pub final_stage: MessageStage,
    /// `bucket/key@etag` once the envelope parsed
    pub object: Option<String>,
    pub bytes_transferred: Option<u64>,
    pub converted_units: usize,
    /// Error that led to a reject or requeue
    pub error: Option<String>,
    /// Set when the broker did not accept the settlement
    pub settlement_error: Option<MessagingError>,
    pub duration: Duration,
}

impl ProcessingReport {
    pub fn settled(&self) -> bool {
        self.settlement_error.is_none()
    }
}

#[derive(Debug, Default)]
struct Progress {
    object: Option<String>,
    bytes_transferred: Option<u64>,
    converted_units: usize,
}

pub struct MessagePipeline {
    expected_routing_key: String,
    scratch_root: PathBuf,
    transfer: Arc<ObjectTransfer>,
    runner: Arc<ConversionRunner>,
    record_keeper: Arc<dyn RecordKeeper>,
    record_keeping_timeout: Duration,
    tracker: Arc<RedeliveryTracker>,
}

impl std::fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("expected_routing_key", &self.expected_routing_key)
            .field("scratch_root", &self.scratch_root)
            .field("transfer", &self.transfer)
            .field("runner", &self.runner)
            .field("record_keeper", &self.record_keeper.name())
            .field("record_keeping_timeout", &self.record_keeping_timeout)
            .finish()
    }
}

impl MessagePipeline {
    pub fn new(
        expected_routing_key: impl Into<String>,
        scratch_root: impl Into<PathBuf>,
        transfer: Arc<ObjectTransfer>,
        runner: Arc<ConversionRunner>,
        record_keeper: Arc<dyn RecordKeeper>,
        record_keeping_timeout: Duration,
        tracker: Arc<RedeliveryTracker>,
    ) -> Self {
        Self {
            expected_routing_key: expected_routing_key.into(),
            scratch_root: scratch_root.into(),
            transfer,
            runner,
            record_keeper,
            record_keeping_timeout,
            tracker,
        }
    }

    pub fn tracker(&self) -> &RedeliveryTracker {
        &self.tracker
    }

    /// Process and settle one delivery
    pub async fn process(&self, message: InboundMessage) -> ProcessingReport {
        let span = message_span(&message.delivery_id, message.redelivered);
        self.process_in_span(message, span.clone())
            .instrument(span)
            .await
    }

    async fn process_in_span(&self, message: InboundMessage, span: Span) -> ProcessingReport {
        let started = Instant::now();
        let mut stages = StageCursor::new();
        let mut progress = Progress::default();

        info!(
            routing_key = %message.routing_key,
            delivery_count = ?message.delivery_count,
            body_bytes = message.body.len(),
            "📨 Message received"
        );

        let result = self
            .execute(&message, &mut stages, &mut progress, &span)
            .await
            .map_err(|e| self.enforce_delivery_limit(e, message.delivery_count, &progress));

        let (disposition, error) = match &result {
            Ok(()) => (Disposition::ack(), None),
            Err(e) => (Disposition::for_error(e), Some(e.to_string())),
        };

        stages.advance(MessageStage::for_decision(disposition.decision));
        log_message_settled(disposition.decision, &disposition.reason);

        let delivery_id = message.delivery_id.clone();
        let settlement_error = match message.settle(disposition.decision).await {
            Ok(()) => None,
            Err(e) => {
                error!(
                    decision = %disposition.decision,
                    error = %e,
                    "❌ Settlement failed; broker will redeliver after reconnect"
                );
                Some(e)
            }
        };

        ProcessingReport {
            delivery_id,
            decision: disposition.decision,
            final_stage: stages.current(),
            object: progress.object,
            bytes_transferred: progress.bytes_transferred,
            converted_units: progress.converted_units,
            error,
            settlement_error,
            duration: started.elapsed(),
        }
    }

    async fn execute(
        &self,
        message: &InboundMessage,
        stages: &mut StageCursor,
        progress: &mut Progress,
        span: &Span,
    ) -> Result<(), IngestError> {
        if message.routing_key != self.expected_routing_key {
            return Err(IngestError::routing_key_mismatch(
                &self.expected_routing_key,
                &message.routing_key,
            ));
        }

        let record = events::parse(&message.body).and_then(events::single_record)?;
        let location = &record.location;
        record_object(span, &location.bucket_name, &location.object_key, location.size);
        progress.object = Some(location.identity());
        stages.advance(MessageStage::Parsed);

        if !record.is_object_created() {
            warn!(event_name = %record.event_name, "⚠️ Processing a non-creation event");
        }

        let subject = ConversionSubject::from(&record);
        self.call_record_keeper("conversion_started", self.record_keeper.conversion_started(&subject))
            .await?;

        stages.advance(MessageStage::Downloading);
        let working = WorkingFile::create(&self.scratch_root, &location.object_key).await?;
        let bytes = self.transfer.download(location, working.path()).await?;
        progress.bytes_transferred = Some(bytes);

        stages.advance(MessageStage::Converting);
        let conversion_started = Instant::now();
        let conversion = self
            .runner
            .run_conversion_with(working.path(), log_output_line)
            .await
            .and_then(ConversionOutcome::into_result);
        working.close().await;

        let result = match &conversion {
            Ok(outcome) => ConversionResult::success(
                outcome.exit_code,
                outcome.units().len(),
                outcome.duration,
            ),
            Err(e) => ConversionResult::failure(e.exit_code(), conversion_started.elapsed(), e),
        };
        let finished = self
            .call_record_keeper(
                "conversion_finished",
                self.record_keeper.conversion_finished(&subject, &result),
            )
            .await;

        match conversion {
            Ok(outcome) => {
                self.tracker.clear(&location.identity());
                progress.converted_units = outcome.units().len();
                info!(
                    units = progress.converted_units,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "✅ Conversion succeeded"
                );
                // Processing is idempotent, so an unrecorded finish is retried as a whole
                finished.map_err(IngestError::from)
            }
            Err(e) => {
                if let Err(record_error) = finished {
                    warn!(error = %record_error, "Conversion finish not recorded");
                }
                Err(self.conversion_failure(&record, e))
            }
        }
    }

    fn conversion_failure(&self, record: &Record, error: ConversionError) -> IngestError {
        let identity = record.location.identity();
        let attempts = self.tracker.record_failure(&identity);
        if self.tracker.is_exhausted(attempts) {
            self.tracker.clear(&identity);
            error!(
                attempts = attempts,
                error = %error,
                "❌ Conversion attempts exhausted"
            );
            IngestError::attempts_exhausted(identity, attempts, error)
        } else {
            warn!(
                attempts = attempts,
                limit = ?self.tracker.limit(),
                error = %error,
                "⚠️ Conversion failed"
            );
            IngestError::Conversion(error)
        }
    }

    /// Turn a transient failure into a permanent one once the broker delivery limit is hit
    fn enforce_delivery_limit(
        &self,
        error: IngestError,
        delivery_count: Option<u32>,
        progress: &Progress,
    ) -> IngestError {
        if error.is_permanent() || !self.tracker.deliveries_exhausted(delivery_count) {
            return error;
        }
        let (Some(deliveries), Some(limit)) = (delivery_count, self.tracker.delivery_limit()) else {
            return error;
        };
        if let Some(identity) = &progress.object {
            self.tracker.clear(identity);
        }
        error!(
            deliveries = deliveries,
            limit = limit,
            error = %error,
            "❌ Delivery limit reached"
        );
        IngestError::delivery_limit_reached(deliveries, limit, error)
    }

    async fn call_record_keeper<F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<(), RecordKeepingError>
    where
        F: std::future::Future<Output = Result<(), RecordKeepingError>>,
    {
        match tokio::time::timeout(self.record_keeping_timeout, call).await {
            Ok(Ok(())) => {
                debug!(operation = operation, "Record keeping call succeeded");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecordKeepingError::timed_out(
                operation,
                self.record_keeping_timeout.as_millis() as u64,
            )),
        }
    }
}

fn log_output_line(line: &str) {
    match ConvertedUnit::parse_line(line) {
        Some(unit) => info!(unit_key = %unit.key, class = %unit.class, "🧩 Converted unit"),
        None => debug!(line = %line, "Converter output"),
    }
}
