//! Message-queue provider
//!
//! Serializes each event's wire envelope and enqueues it on a
//! `MessageQueue` destination. The bundled destination is NATS JetStream
//! (`NatsQueue`); anything else plugs in through the trait.
//!
//! Batches are enqueued one message at a time. If a message in the middle
//! of a batch fails, the batch is reported as failed but the messages
//! already enqueued stay on the queue, so consumers must dedup by `id`.
//! Failures are not retried here.

mod nats;

pub use nats::{NatsQueue, QueueConfig, StorageType};

use crate::error::{EventError, Result};
use crate::provider::EventProvider;
use crate::types::{DomainEvent, WireEvent};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A destination that accepts opaque message bodies
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue one message; returns once the destination acknowledged it
    async fn enqueue(&self, body: Bytes) -> Result<()>;

    /// Human-readable destination (URL, subject) for logs and errors
    fn destination(&self) -> &str;

    /// Whether the underlying connection is currently usable
    async fn is_connected(&self) -> bool {
        true
    }

    /// Flush and release the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// How message bodies are encoded on the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueEncoding {
    /// Raw JSON bytes
    #[default]
    Json,
    /// Standard base64 of the JSON bytes, for text-only queue consumers
    Base64,
}

/// Provider that enqueues each event as one queue message
pub struct QueueProvider {
    name: String,
    queue: Arc<dyn MessageQueue>,
    encoding: QueueEncoding,
}

impl QueueProvider {
    /// Wrap an existing queue connection
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        encoding: QueueEncoding,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            encoding,
        }
    }

    /// Connect to NATS JetStream and build a provider on top of it
    pub async fn connect(name: impl Into<String>, config: QueueConfig) -> Result<Self> {
        let encoding = config.encoding;
        let queue = NatsQueue::connect(config).await?;
        Ok(Self::new(name, Arc::new(queue), encoding))
    }

    fn encode(&self, event: &DomainEvent) -> Result<Bytes> {
        let json = serde_json::to_vec(&WireEvent::from(event))?;
        Ok(match self.encoding {
            QueueEncoding::Json => Bytes::from(json),
            QueueEncoding::Base64 => {
                Bytes::from(base64::engine::general_purpose::STANDARD.encode(json))
            }
        })
    }

    async fn enqueue(&self, event: &DomainEvent) -> Result<()> {
        let body = self.encode(event)?;
        self.queue.enqueue(body).await?;

        tracing::debug!(
            provider = %self.name,
            event_id = %event.id,
            sequence = event.sequence_number,
            destination = %self.queue.destination(),
            "Event enqueued"
        );
        Ok(())
    }
}

#[async_trait]
impl EventProvider for QueueProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.enqueue(event).await
    }

    async fn publish_batch(&self, events: &[DomainEvent]) -> Result<()> {
        for (index, event) in events.iter().enumerate() {
            if let Err(e) = self.enqueue(event).await {
                tracing::warn!(
                    provider = %self.name,
                    enqueued = index,
                    total = events.len(),
                    error = %e,
                    "Batch enqueue stopped midway; earlier messages remain enqueued"
                );
                return Err(match e {
                    EventError::Transient { destination, reason } => EventError::Transient {
                        destination,
                        reason: format!("{} (after {} of {} messages)", reason, index, events.len()),
                    },
                    other => other,
                });
            }
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        self.queue.is_connected().await
    }

    async fn close(&self) -> Result<()> {
        self.queue.close().await
    }
}
