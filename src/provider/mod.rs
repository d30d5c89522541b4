//! Event provider trait: the core abstraction for delivery destinations
//!
//! Every destination (message queue, webhook, append-only log, in-memory
//! buffer) implements `EventProvider`. The `EventManager` fans each event
//! out to all configured providers and isolates their failures.

use crate::error::Result;
use crate::types::DomainEvent;
use async_trait::async_trait;

pub mod file;
pub mod memory;
pub mod queue;
pub mod webhook;

/// Core trait for delivery destinations
///
/// Implementations own and synchronize their own mutable state; the
/// manager may call into one provider from several tasks at once.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Provider name, unique within one manager (e.g., "audit-log")
    fn name(&self) -> &str;

    /// Deliver a single event
    async fn publish(&self, event: &DomainEvent) -> Result<()>;

    /// Deliver several events as one unit
    ///
    /// The batch is accepted or rejected as a whole by this provider.
    /// Providers that cannot offer that (see `QueueProvider`) document
    /// their partial-delivery behavior.
    async fn publish_batch(&self, events: &[DomainEvent]) -> Result<()>;

    /// Health check, returns true if the provider looks operational
    ///
    /// Used for diagnostics only; a failing check never stops delivery
    /// attempts.
    async fn health(&self) -> bool {
        true
    }

    /// Release connections and handles. Calling it twice is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
