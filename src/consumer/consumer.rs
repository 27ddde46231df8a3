//! # Ingestion Consumer
//!
//! Admission loop over a [`MessageSource`] subscription.
//!
//! A semaphore with `prefetch_count` permits bounds the number of deliveries
//! in flight. A permit is taken before the next delivery is pulled and is
//! released when that delivery's task ends, so the local window never exceeds
//! the broker's.
//!
//! ## Shutdown
//!
//! When the shutdown future completes the loop stops pulling deliveries,
//! waits for every in-flight task to settle its message, then closes the
//! source. Conversions are never cut short by shutdown.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::pipeline::{MessagePipeline, ProcessingReport};
use super::redelivery::RedeliveryTracker;
use crate::config::IngestConfig;
use crate::conversion::ConversionRunner;
use crate::error::IngestError;
use crate::messaging::{AckDecision, MessageSource};
use crate::record_keeping::RecordKeeper;
use crate::transfer::ObjectTransfer;

/// Totals for one [`IngestionConsumer::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerSummary {
    pub received: u64,
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
    pub settlement_failures: u64,
    /// Tasks that panicked; their deliveries were never settled
    pub task_failures: u64,
}

impl ConsumerSummary {
    fn record(&mut self, joined: Result<ProcessingReport, JoinError>) {
        match joined {
            Ok(report) => {
                if !report.settled() {
                    self.settlement_failures += 1;
                    return;
                }
                match report.decision {
                    AckDecision::Ack => self.acked += 1,
                    AckDecision::Reject => self.rejected += 1,
                    AckDecision::Requeue => self.requeued += 1,
                }
            }
            Err(e) => {
                error!(error = %e, "❌ Message task failed before settlement");
                self.task_failures += 1;
            }
        }
    }
}

pub struct IngestionConsumer {
    source: Arc<dyn MessageSource>,
    pipeline: Arc<MessagePipeline>,
    window: usize,
}

impl std::fmt::Debug for IngestionConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionConsumer")
            .field("source", &self.source.provider_name())
            .field("pipeline", &self.pipeline)
            .field("window", &self.window)
            .finish()
    }
}

impl IngestionConsumer {
    pub fn new(
        config: &IngestConfig,
        source: Arc<dyn MessageSource>,
        transfer: ObjectTransfer,
        runner: ConversionRunner,
        record_keeper: Arc<dyn RecordKeeper>,
    ) -> Self {
        let tracker = Arc::new(
            RedeliveryTracker::new(config.consumer.attempt_limit())
                .with_delivery_limit(config.consumer.delivery_limit()),
        );
        let pipeline = MessagePipeline::new(
            config.broker.routing_key.clone(),
            config.transfer.scratch_root.clone(),
            Arc::new(transfer),
            Arc::new(runner),
            record_keeper,
            config.consumer.record_keeping_timeout(),
            tracker,
        );

        Self {
            source,
            pipeline: Arc::new(pipeline),
            window: usize::from(config.broker.prefetch_count.max(1)),
        }
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    /// Consume until `shutdown` completes or the subscription fails
    ///
    /// Returns an error only for subscription-level failures, after in-flight
    /// deliveries have been settled and the source closed.
    pub async fn run<F>(&self, shutdown: F) -> Result<ConsumerSummary, IngestError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut deliveries = self.source.subscribe().await?;
        let semaphore = Arc::new(Semaphore::new(self.window));
        let mut tasks: JoinSet<ProcessingReport> = JoinSet::new();
        let mut summary = ConsumerSummary::default();
        let mut fatal: Option<IngestError> = None;

        info!(
            provider = self.source.provider_name(),
            window = self.window,
            "🚀 Ingestion consumer started"
        );

        tokio::pin!(shutdown);

        loop {
            while let Some(joined) = tasks.try_join_next() {
                summary.record(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(in_flight = tasks.len(), "🛑 Shutdown requested");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(in_flight = tasks.len(), "🛑 Shutdown requested");
                    break;
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    summary.received += 1;
                    let pipeline = self.pipeline.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        pipeline.process(message).await
                    });
                }
                Some(Err(e)) if e.is_connection_level() => {
                    error!(error = %e, "❌ Subscription failed");
                    fatal = Some(e.into());
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "⚠️ Skipping undeliverable message");
                }
                None => {
                    warn!("Delivery stream ended");
                    break;
                }
            }
        }

        drop(deliveries);

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "⏳ Waiting for in-flight messages to settle");
        }
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Failed to close message source");
        }

        info!(
            received = summary.received,
            acked = summary.acked,
            rejected = summary.rejected,
            requeued = summary.requeued,
            settlement_failures = summary.settlement_failures,
            task_failures = summary.task_failures,
            "🏁 Ingestion consumer stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
