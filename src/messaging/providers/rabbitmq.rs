//! # RabbitMQ Message Source
//!
//! AMQP 0.9.1 subscription to the notification queue using the `lapin` crate.
//!
//! ## Topology
//!
//! Bucket notifications are published to a durable topic exchange; the
//! consumer reads a durable queue bound to it. When `declare_topology` is set
//! the exchange, queue and binding are (re)declared idempotently on connect;
//! otherwise they are expected to exist.
//!
//! ## Settlement
//!
//! | Decision | AMQP call |
//! |----------|-----------|
//! | Ack      | `basic.ack` |
//! | Reject   | `basic.reject` with `requeue=false` |
//! | Requeue  | `basic.nack` with `requeue=true` |
//!
//! Quorum queues report prior delivery attempts in the `x-delivery-count`
//! header; classic queues only expose the `redelivered` flag.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::constants::broker::DELIVERY_COUNT_HEADER;
use crate::logging::redact_url;
use crate::messaging::errors::MessagingError;
use crate::messaging::traits::MessageSource;
use crate::messaging::types::{AckDecision, DeliveryId, DeliveryStream, InboundMessage, MessageAcker};

/// RabbitMQ-backed [`MessageSource`]
#[derive(Debug)]
pub struct RabbitMqMessageSource {
    connection: Connection,
    channel: Channel,
    config: BrokerConfig,
}

impl RabbitMqMessageSource {
    /// Connect, apply the prefetch window and optionally declare topology
    pub async fn connect(config: &BrokerConfig) -> Result<Self, MessagingError> {
        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default().with_connection_name(config.connection_name.clone().into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {}", e)))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {}", e))
        })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {}", e))
            })?;

        let source = Self {
            connection,
            channel,
            config: config.clone(),
        };

        if config.declare_topology {
            source.declare_topology().await?;
        } else {
            source.check_queue().await?;
        }

        info!(
            endpoint = %source.connection_url_redacted(),
            exchange = %config.exchange,
            queue = %config.queue,
            prefetch_count = config.prefetch_count,
            "✅ Connected to RabbitMQ"
        );

        Ok(source)
    }

    pub fn prefetch_count(&self) -> u16 {
        self.config.prefetch_count
    }

    /// Scheme and host only; credentials are never logged
    pub fn connection_url_redacted(&self) -> String {
        redact_url(&self.config.url)
    }

    async fn check_queue(&self) -> Result<(), MessagingError> {
        let passive = QueueDeclareOptions {
            passive: true,
            ..Default::default()
        };
        let state = self
            .channel
            .queue_declare(&self.config.queue, passive, FieldTable::default())
            .await
            .map_err(|e| MessagingError::topology(&self.config.queue, e.to_string()))?;

        debug!(
            queue = %self.config.queue,
            message_count = state.message_count(),
            consumer_count = state.consumer_count(),
            "Queue exists"
        );
        Ok(())
    }

    async fn declare_topology(&self) -> Result<(), MessagingError> {
        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::topology(&self.config.exchange, e.to_string()))?;

        let durable_queue = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(&self.config.queue, durable_queue, FieldTable::default())
            .await
            .map_err(|e| MessagingError::topology(&self.config.queue, e.to_string()))?;

        self.channel
            .queue_bind(
                &self.config.queue,
                &self.config.exchange,
                &self.config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::topology(&self.config.queue, e.to_string()))?;

        debug!(
            exchange = %self.config.exchange,
            queue = %self.config.queue,
            routing_key = %self.config.routing_key,
            "Topology declared"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageSource for RabbitMqMessageSource {
    async fn subscribe(&self) -> Result<DeliveryStream, MessagingError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.config.queue,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::subscribe(&self.config.queue, e.to_string()))?;

        info!(
            queue = %self.config.queue,
            consumer_tag = %self.config.consumer_tag,
            "📡 Subscribed to notification queue"
        );

        let queue = self.config.queue.clone();
        Ok(consumer
            .map(move |result| match result {
                Ok(delivery) => Ok(into_inbound(delivery)),
                Err(e) => Err(MessagingError::receive(&queue, e.to_string())),
            })
            .boxed())
    }

    async fn close(&self) -> Result<(), MessagingError> {
        if let Err(e) = self
            .channel
            .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(error = %e, "Failed to cancel consumer before close");
        }

        self.channel
            .close(200, "consumer shutdown")
            .await
            .map_err(|e| MessagingError::connection(format!("Channel close failed: {}", e)))?;
        self.connection
            .close(200, "consumer shutdown")
            .await
            .map_err(|e| MessagingError::connection(format!("Connection close failed: {}", e)))?;

        info!("🔌 RabbitMQ connection closed");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        if self.connection.status().connected() {
            Ok(true)
        } else {
            Err(MessagingError::health_check(
                "RabbitMQ connection is not connected",
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

struct LapinAcker {
    acker: Acker,
    delivery_tag: u64,
}

#[async_trait]
impl MessageAcker for LapinAcker {
    async fn settle(&self, decision: AckDecision) -> Result<(), MessagingError> {
        let result = match decision {
            AckDecision::Ack => self.acker.ack(BasicAckOptions::default()).await,
            AckDecision::Reject => {
                self.acker
                    .reject(BasicRejectOptions { requeue: false })
                    .await
            }
            AckDecision::Requeue => {
                self.acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
        };

        result.map_err(|e| {
            MessagingError::settlement(self.delivery_tag.to_string(), decision, e.to_string())
        })
    }
}

fn into_inbound(delivery: Delivery) -> InboundMessage {
    let prior_deliveries = delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| header_u32(headers, DELIVERY_COUNT_HEADER));

    let delivery_count = match prior_deliveries {
        Some(prior) => Some(prior.saturating_add(1)),
        None if !delivery.redelivered => Some(1),
        None => None,
    };

    InboundMessage::new(
        DeliveryId::from(delivery.delivery_tag),
        delivery.routing_key.as_str(),
        Bytes::from(delivery.data),
        Box::new(LapinAcker {
            acker: delivery.acker,
            delivery_tag: delivery.delivery_tag,
        }),
    )
    .with_redelivery(delivery.redelivered, delivery_count)
}

fn header_u32(headers: &FieldTable, name: &str) -> Option<u32> {
    let (_, value) = headers.inner().iter().find(|(key, _)| key.as_str() == name)?;
    match value {
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}
