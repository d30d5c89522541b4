//! In-memory provider for tests and debug inspection
//!
//! Keeps received events in arrival order. Not durable.

use crate::error::{EventError, Result};
use crate::provider::EventProvider;
use crate::types::DomainEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory provider configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Maximum retained events, oldest evicted first (0 = unbounded)
    pub max_events: usize,
}

/// Provider that retains every received event in process memory
///
/// Insertion order is receipt order, which under concurrent publishing
/// need not match `sequence_number` order.
pub struct InMemoryProvider {
    name: String,
    events: Arc<RwLock<Vec<DomainEvent>>>,
    config: MemoryConfig,
    closed: AtomicBool,
}

impl InMemoryProvider {
    /// Create a provider with the given name and configuration
    pub fn new(name: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            name: name.into(),
            events: Arc::new(RwLock::new(Vec::new())),
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Snapshot of all retained events in arrival order
    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.read().await.clone()
    }

    /// Number of retained events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Look up a retained event by id
    pub async fn get(&self, id: Uuid) -> Option<DomainEvent> {
        self.events.read().await.iter().find(|e| e.id == id).cloned()
    }

    /// Drop all retained events
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn enforce_capacity(&self, events: &mut Vec<DomainEvent>) {
        if self.config.max_events > 0 && events.len() > self.config.max_events {
            let drain_count = events.len() - self.config.max_events;
            events.drain(..drain_count);
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new("memory", MemoryConfig::default())
    }
}

#[async_trait]
impl EventProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.ensure_open()?;
        let mut events = self.events.write().await;
        events.push(event.clone());
        self.enforce_capacity(&mut events);
        Ok(())
    }

    async fn publish_batch(&self, batch: &[DomainEvent]) -> Result<()> {
        self.ensure_open()?;
        let mut events = self.events.write().await;
        events.extend_from_slice(batch);
        self.enforce_capacity(&mut events);
        Ok(())
    }

    async fn health(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;

    fn event(seq: u64) -> DomainEvent {
        DomainEvent::new(
            EventType::ImageCreated,
            format!("/studies/s/series/r/instances/{}", seq),
            serde_json::json!({}),
            "test",
            seq,
        )
    }

    #[tokio::test]
    async fn test_publish_and_query() {
        let provider = InMemoryProvider::default();
        assert!(provider.is_empty().await);

        let e = event(1);
        provider.publish(&e).await.unwrap();

        assert_eq!(provider.len().await, 1);
        assert_eq!(provider.get(e.id).await.unwrap().sequence_number, 1);
        assert!(provider.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = InMemoryProvider::default();
        let batch: Vec<DomainEvent> = [1, 2, 4].into_iter().map(event).collect();
        provider.publish_batch(&batch).await.unwrap();

        let seqs: Vec<u64> = provider.events().await.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_max_events_evicts_oldest() {
        let provider = InMemoryProvider::new("capped", MemoryConfig { max_events: 3 });
        for seq in 1..=5 {
            provider.publish(&event(seq)).await.unwrap();
        }

        let seqs: Vec<u64> = provider.events().await.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_publish() {
        let provider = InMemoryProvider::default();
        provider.publish(&event(1)).await.unwrap();

        provider.close().await.unwrap();
        provider.close().await.unwrap();

        assert!(!provider.health().await);
        assert!(matches!(provider.publish(&event(2)).await, Err(EventError::Closed(_))));
        // Retained events stay inspectable after close
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let provider = InMemoryProvider::default();
        provider.publish(&event(1)).await.unwrap();
        provider.clear().await;
        assert!(provider.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish() {
        let provider = Arc::new(InMemoryProvider::default());
        let mut handles = Vec::new();
        for seq in 0..100 {
            let p = provider.clone();
            handles.push(tokio::spawn(async move { p.publish(&event(seq)).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(provider.len().await, 100);
    }
}
