//! Provider and manager configuration
//!
//! Loading these from files or the environment is the host service's job;
//! this module only defines the shapes and their validation. Everything
//! deserializes from camelCase JSON (or any serde format).
//!
//! ```json
//! [
//!   { "type": "webhook", "name": "pacs-hook", "url": "https://pacs.example/events" },
//!   { "type": "file", "path": "/var/log/dicom/events.jsonl" },
//!   { "type": "memory", "enabled": false }
//! ]
//! ```

use crate::error::{EventError, Result};
use crate::provider::file::FileLogConfig;
use crate::provider::memory::MemoryConfig;
use crate::provider::queue::QueueConfig;
use crate::provider::webhook::WebhookConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-provider publish timeout in milliseconds
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5000;

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Time budget for each provider call, in milliseconds
    pub publish_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

impl ManagerConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.publish_timeout_ms == 0 {
            return Err(EventError::Config(
                "publishTimeoutMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Type-specific provider parameters, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProviderKind {
    Queue(QueueConfig),
    Webhook(WebhookConfig),
    File(FileLogConfig),
    Memory(MemoryConfig),
}

impl ProviderKind {
    /// Type tag, also the default provider name
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderKind::Queue(_) => "queue",
            ProviderKind::Webhook(_) => "webhook",
            ProviderKind::File(_) => "file",
            ProviderKind::Memory(_) => "memory",
        }
    }
}

/// One configured delivery destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Unique name; defaults to the type tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Disabled providers are skipped at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub kind: ProviderKind,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Enabled provider with the default name
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: None,
            enabled: true,
            kind,
        }
    }

    /// Set an explicit provider name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the provider as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Effective provider name
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.type_name())
    }

    /// Check type-specific parameters without touching the network
    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(EventError::Config("provider name must not be blank".to_string()));
        }
        match &self.kind {
            ProviderKind::Queue(c) => c.validate(),
            ProviderKind::Webhook(c) => c.validate(),
            ProviderKind::File(c) => c.validate(),
            ProviderKind::Memory(_) => Ok(()),
        }
        .map_err(|e| match e {
            EventError::Config(msg) => EventError::Config(format!("provider '{}': {}", self.name(), msg)),
            other => other,
        })
    }
}
