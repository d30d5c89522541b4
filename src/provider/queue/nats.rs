//! NATS JetStream queue destination

use super::{MessageQueue, QueueEncoding};
use crate::error::{EventError, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// JetStream storage backend for the event stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Queue provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// NATS server URL
    pub url: String,
    /// JetStream stream backing the queue
    pub stream_name: String,
    /// Subject every event is enqueued on
    pub subject: String,
    pub storage: StorageType,
    /// Stream message cap (-1 = unlimited)
    pub max_events: i64,
    /// Stream message age cap in seconds (0 = unlimited)
    pub max_age_secs: u64,
    pub connect_timeout_secs: u64,
    /// Publish-ack timeout in seconds
    pub request_timeout_secs: u64,
    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub encoding: QueueEncoding,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "DICOM_EVENTS".to_string(),
            subject: "dicom.events".to_string(),
            storage: StorageType::File,
            max_events: -1,
            max_age_secs: 0,
            connect_timeout_secs: 5,
            request_timeout_secs: 2,
            token: None,
            encoding: QueueEncoding::Json,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("nats://") && !self.url.starts_with("tls://") {
            return Err(EventError::Config(format!(
                "queue url '{}' must use nats:// or tls://",
                self.url
            )));
        }
        if self.stream_name.is_empty() || self.stream_name.contains(['.', ' ', '*', '>']) {
            return Err(EventError::Config(format!(
                "invalid queue stream name '{}'",
                self.stream_name
            )));
        }
        if self.subject.is_empty() || self.subject.contains(['*', '>', ' ']) {
            return Err(EventError::Config(format!(
                "queue subject '{}' must be a concrete subject",
                self.subject
            )));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(EventError::Config(
                "queue timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// JetStream-backed message queue
///
/// The connection is established once in `connect` and reused for every
/// publish. Connection errors surface as transient failures and are not
/// retried here.
pub struct NatsQueue {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    subject: String,
    closed: AtomicBool,
}

impl NatsQueue {
    /// Connect to NATS and make sure the stream exists
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let client = build_connect_options(&config)
            .connect(&config.url)
            .await
            .map_err(|e| EventError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            subject: config.subject,
            closed: AtomicBool::new(false),
        })
    }

    fn transient(&self, reason: impl Into<String>) -> EventError {
        EventError::Transient {
            destination: self.subject.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MessageQueue for NatsQueue {
    async fn enqueue(&self, body: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventError::Closed(self.subject.clone()));
        }

        let ack = self
            .jetstream
            .publish(self.subject.clone(), body)
            .await
            .map_err(|e| self.transient(e.to_string()))?
            .await
            .map_err(|e| self.transient(format!("ack failed: {}", e)))?;

        tracing::trace!(subject = %self.subject, sequence = ack.sequence, "JetStream ack");
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.subject
    }

    async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && matches!(
                self.client.connection_state(),
                async_nats::connection::State::Connected
            )
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client
            .flush()
            .await
            .map_err(|e| EventError::Connection(format!("flush on close failed: {}", e)))?;
        tracing::info!(subject = %self.subject, "NATS queue closed");
        Ok(())
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &QueueConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the JetStream stream exists with the correct configuration
async fn ensure_stream(js: &jetstream::Context, config: &QueueConfig) -> Result<()> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: vec![config.subject.clone()],
        storage,
        max_messages: config.max_events,
        max_age: Duration::from_secs(config.max_age_secs),
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    js.get_or_create_stream(stream_config).await.map_err(|e| {
        EventError::Connection(format!(
            "Failed to create/get stream '{}': {}",
            config.stream_name, e
        ))
    })?;

    tracing::info!(
        stream = %config.stream_name,
        subject = %config.subject,
        "JetStream stream ready"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.encoding, QueueEncoding::Json);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad_url = QueueConfig {
            url: "http://localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_url.validate(), Err(EventError::Config(_))));

        let wildcard = QueueConfig {
            subject: "dicom.>".to_string(),
            ..Default::default()
        };
        assert!(wildcard.validate().is_err());

        let dotted_stream = QueueConfig {
            stream_name: "dicom.events".to_string(),
            ..Default::default()
        };
        assert!(dotted_stream.validate().is_err());
    }

    #[test]
    fn test_config_deserialization() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"url": "nats://queue:4222", "subject": "imaging.changes", "encoding": "base64"}"#,
        )
        .unwrap();
        assert_eq!(config.url, "nats://queue:4222");
        assert_eq!(config.subject, "imaging.changes");
        assert_eq!(config.encoding, QueueEncoding::Base64);
        assert_eq!(config.stream_name, "DICOM_EVENTS");
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_before_dialing() {
        let config = QueueConfig {
            subject: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            NatsQueue::connect(config).await,
            Err(EventError::Config(_))
        ));
    }
}
