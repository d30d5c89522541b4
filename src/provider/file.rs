//! Append-only JSON-lines file provider
//!
//! Each event becomes one line holding its wire envelope. All writes to
//! the file go through one async mutex, so concurrent publishes never
//! interleave or split a line.

use crate::error::{EventError, Result};
use crate::provider::EventProvider;
use crate::types::{DomainEvent, WireEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File log provider configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLogConfig {
    /// Path of the log file; created if missing, always appended to
    pub path: PathBuf,
}

impl FileLogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(EventError::Config("file provider requires a path".to_string()));
        }
        Ok(())
    }
}

/// Provider appending one JSON line per event to a local file
pub struct FileLogProvider {
    name: String,
    path: PathBuf,
    /// `None` once closed
    file: Mutex<Option<File>>,
}

impl FileLogProvider {
    /// Open (or create) the log file for appending
    pub async fn open(name: impl Into<String>, config: FileLogConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EventError::Config(format!(
                    "Failed to create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .map_err(|e| {
                EventError::Config(format!(
                    "Failed to open event log {}: {}",
                    config.path.display(),
                    e
                ))
            })?;

        let name = name.into();
        tracing::info!(provider = %name, path = %config.path.display(), "Event log opened");

        Ok(Self {
            name,
            path: config.path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| EventError::Closed(self.name.clone()))?;
        file.write_all(buf).await?;
        file.flush().await?;
        Ok(())
    }
}

fn encode_line(event: &DomainEvent, buf: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *buf, &WireEvent::from(event))?;
    buf.push(b'\n');
    Ok(())
}

#[async_trait]
impl EventProvider for FileLogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let mut buf = Vec::with_capacity(512);
        encode_line(event, &mut buf)?;
        self.append(&buf).await?;

        tracing::debug!(
            provider = %self.name,
            event_id = %event.id,
            sequence = event.sequence_number,
            "Event appended to log"
        );
        Ok(())
    }

    async fn publish_batch(&self, events: &[DomainEvent]) -> Result<()> {
        // Encode everything first so a serialization error writes nothing
        let mut buf = Vec::with_capacity(512 * events.len());
        for event in events {
            encode_line(event, &mut buf)?;
        }
        self.append(&buf).await
    }

    async fn health(&self) -> bool {
        self.file.lock().await.is_some()
    }

    async fn close(&self) -> Result<()> {
        let file = self.file.lock().await.take();
        if let Some(mut file) = file {
            file.flush().await?;
            file.sync_all().await?;
            tracing::info!(provider = %self.name, path = %self.path.display(), "Event log closed");
        }
        Ok(())
    }
}
