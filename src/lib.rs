//! # dicom-event
//!
//! Best-effort domain event fan-out for a DICOM storage service.
//!
//! ## Overview
//!
//! Every committed create, update or delete of an imaging object may be
//! announced to downstream consumers (work queues, webhooks, audit logs).
//! `dicom-event` delivers those announcements without ever letting a
//! notification failure reach the write path that produced them.
//!
//! ## Quick Start
//!
//! ```rust
//! use dicom_event::{DomainEvent, EventManager, EventType, InMemoryProvider, InstanceRef, ManagerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> dicom_event::Result<()> {
//! let memory = Arc::new(InMemoryProvider::default());
//! let manager = EventManager::new(ManagerConfig::default())
//!     .with_shared_provider(memory.clone());
//!
//! // Sequence number comes from the change feed allocator
//! let instance = InstanceRef::new("1.2.3", "1.2.3.4", "1.2.3.4.5");
//! let event = DomainEvent::for_instance(EventType::ImageCreated, &instance, "dicom-east-1", 42);
//!
//! let report = manager.publish(&event).await?;
//! assert!(report.is_success());
//! assert_eq!(memory.len().await, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **queue**: NATS JetStream work queue
//! - **webhook**: HTTP POST with bounded exponential-backoff retry
//! - **file**: append-only JSON-lines log
//! - **memory**: in-process buffer for tests and debugging
//!
//! ## Architecture
//!
//! - **EventProvider** trait: the contract every destination implements
//! - **EventManager**: concurrent fan-out with per-provider timeouts
//! - **DomainEvent**: immutable event value; **WireEvent**: its external JSON shape
//! - **RetryPolicy**: backoff schedule for providers that retry internally

pub mod config;
pub mod error;
pub mod manager;
pub mod provider;
pub mod retry;
pub mod types;

// Re-export core types
pub use config::{ManagerConfig, ProviderConfig, ProviderKind};
pub use error::{EventError, Result};
pub use manager::{DeliveryOutcome, EventManager, ProviderOutcome, PublishReport};
pub use provider::EventProvider;
pub use retry::RetryPolicy;
pub use types::{validate_batch, DomainEvent, EventType, InstanceRef, WireEvent};

// Re-export providers for convenience
pub use provider::file::{FileLogConfig, FileLogProvider};
pub use provider::memory::{InMemoryProvider, MemoryConfig};
pub use provider::queue::{
    MessageQueue, NatsQueue, QueueConfig, QueueEncoding, QueueProvider, StorageType,
};
pub use provider::webhook::{WebhookConfig, WebhookProvider};
