//! Durable job queue boundary (§6 "Job queue").
//!
//! A narrow trait over a durable, at-least-once message stream with
//! explicit acks, backed by `lapin` (AMQP) — the one message-broker client
//! already in the teacher's dependency tree, promoted from its optional
//! `amqp-broker` feature to this core's default transport (see
//! SPEC_FULL.md §4.11/DESIGN.md).

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};

use crate::error::{Error, Result};

/// A single delivered message, carrying enough state for the caller to
/// ack/nak it explicitly.
pub struct QueueMessage {
    pub payload: Vec<u8>,
    delivery: Delivery,
}

impl QueueMessage {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Durable, at-least-once job queue (§6).
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Publish `payload` (UTF-8 JSON `{"job_id": ..., ...}`, §6) to the
    /// stream's subject. Returns whether the broker accepted the publish.
    async fn publish(&self, payload: &[u8]) -> Result<bool>;

    /// Pull-fetch a single message, waiting up to `timeout`. `None` means
    /// no message arrived within the timeout (C10's `batch=1, timeout=5s`
    /// semantics, ported from `worker.py`).
    async fn fetch_one(&self, timeout: std::time::Duration) -> Result<Option<QueueMessage>>;

    async fn ack(&self, message: QueueMessage) -> Result<()>;
    async fn nak(&self, message: QueueMessage) -> Result<()>;
}

/// AMQP-backed [`DurableQueue`]. The stream name becomes both the exchange
/// and the routing key; the consumer name becomes the durable queue name.
pub struct AmqpQueue {
    channel: Channel,
    exchange: String,
    queue_name: String,
    consumer: Consumer,
}

impl AmqpQueue {
    pub async fn connect(amqp_url: &str, stream_name: &str, consumer_name: &str) -> Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| Error::Queue(format!("failed to connect to broker: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::Queue(format!("failed to open channel: {e}")))?;

        channel
            .exchange_declare(
                stream_name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("failed to declare exchange: {e}")))?;

        let queue_name = format!("{stream_name}.jobs");
        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("failed to declare queue: {e}")))?;

        channel
            .queue_bind(
                &queue_name,
                stream_name,
                &queue_name,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("failed to bind queue: {e}")))?;

        let consumer = channel
            .basic_consume(
                &queue_name,
                consumer_name,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("failed to start consumer: {e}")))?;

        Ok(Self {
            channel,
            exchange: stream_name.to_string(),
            queue_name,
            consumer,
        })
    }
}

#[async_trait]
impl DurableQueue for AmqpQueue {
    async fn publish(&self, payload: &[u8]) -> Result<bool> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.queue_name,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| Error::Queue(format!("publish failed: {e}")))?
            .await
            .map_err(|e| Error::Queue(format!("publish confirm failed: {e}")))?;
        Ok(confirm.is_ack())
    }

    async fn fetch_one(&self, timeout: std::time::Duration) -> Result<Option<QueueMessage>> {
        let mut consumer = self.consumer.clone();
        let next = tokio::time::timeout(timeout, consumer.next()).await;
        match next {
            Ok(Some(Ok(delivery))) => Ok(Some(QueueMessage {
                payload: delivery.data.clone(),
                delivery,
            })),
            Ok(Some(Err(e))) => Err(Error::Queue(format!("consumer error: {e}"))),
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn ack(&self, message: QueueMessage) -> Result<()> {
        message
            .delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| Error::Queue(format!("ack failed: {e}")))
    }

    async fn nak(&self, message: QueueMessage) -> Result<()> {
        message
            .delivery
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Queue(format!("nak failed: {e}")))
    }
}
