//! Fan-out orchestrator
//!
//! `EventManager` hands each event to every configured provider at once,
//! bounds each provider call with its own timeout, and turns every
//! provider failure (error, timeout or panic) into an entry of the
//! returned `PublishReport`. The only error `publish` returns is a
//! malformed event, which is a caller bug.
//!
//! `publish` waits for the fan-out to finish, so it takes at most the
//! configured timeout. Callers that prefer fire-and-forget can spawn it
//! on an `Arc<EventManager>`.

use crate::config::{ManagerConfig, ProviderConfig, ProviderKind};
use crate::error::{EventError, Result};
use crate::provider::file::FileLogProvider;
use crate::provider::memory::InMemoryProvider;
use crate::provider::queue::QueueProvider;
use crate::provider::webhook::WebhookProvider;
use crate::provider::EventProvider;
use crate::types::{validate_batch, DomainEvent};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one provider's delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    TimedOut,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Outcome for a single provider
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub provider: String,
    pub outcome: DeliveryOutcome,
    pub elapsed: Duration,
}

/// Per-provider outcomes of one `publish` or `publish_batch` call
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    /// Outcomes in provider registration order
    pub outcomes: Vec<ProviderOutcome>,
}

impl PublishReport {
    /// True when every provider delivered (vacuously true with none)
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_delivered())
    }

    /// Names of providers that failed or timed out
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.outcome.is_delivered())
            .map(|o| o.provider.as_str())
            .collect()
    }

    /// Names of providers that delivered
    pub fn delivered(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_delivered())
            .map(|o| o.provider.as_str())
            .collect()
    }

    /// Outcome for a provider by name
    pub fn outcome(&self, provider: &str) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.provider == provider)
            .map(|o| &o.outcome)
    }
}

/// Concurrent, failure-isolating fan-out over a fixed set of providers
///
/// Providers are registered at startup and held read-only afterwards;
/// the manager takes no locks of its own.
pub struct EventManager {
    providers: Vec<Arc<dyn EventProvider>>,
    config: ManagerConfig,
}

impl EventManager {
    /// Create a manager with no providers
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            providers: Vec::new(),
            config,
        }
    }

    /// Register a provider (builder style)
    pub fn with_provider(mut self, provider: impl EventProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Register a provider the caller keeps a handle to
    pub fn with_shared_provider(mut self, provider: Arc<dyn EventProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build every enabled provider from validated configuration
    ///
    /// All configs are checked before anything connects, so a bad entry
    /// fails startup without opening files or sockets.
    pub async fn from_configs(config: ManagerConfig, providers: &[ProviderConfig]) -> Result<Self> {
        config.validate()?;

        let mut names = HashSet::new();
        for provider in providers.iter().filter(|p| p.enabled) {
            provider.validate()?;
            if !names.insert(provider.name()) {
                return Err(EventError::Config(format!(
                    "duplicate provider name '{}'",
                    provider.name()
                )));
            }
            if let ProviderKind::Webhook(hook) = &provider.kind {
                let worst = hook.retry.worst_case_latency();
                if worst >= config.publish_timeout() {
                    return Err(EventError::Config(format!(
                        "provider '{}': webhook retry sequence may take {:?}, \
                         which does not fit in the {:?} publish timeout",
                        provider.name(),
                        worst,
                        config.publish_timeout()
                    )));
                }
            }
        }

        let mut manager = Self::new(config);
        for provider in providers {
            if !provider.enabled {
                tracing::debug!(provider = provider.name(), "Provider disabled, skipping");
                continue;
            }
            let built = build_provider(provider).await?;
            tracing::info!(
                provider = provider.name(),
                kind = provider.kind.type_name(),
                "Event provider ready"
            );
            manager.providers.push(built);
        }
        Ok(manager)
    }

    /// Names of registered providers in registration order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Number of registered providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Per-provider time budget
    pub fn publish_timeout(&self) -> Duration {
        self.config.publish_timeout()
    }

    /// Deliver one event to every provider
    ///
    /// Returns `Err` only for an invalid event; delivery failures are
    /// logged and reported in the `PublishReport`.
    pub async fn publish(&self, event: &DomainEvent) -> Result<PublishReport> {
        event.validate()?;

        let outcomes = join_all(
            self.providers
                .iter()
                .map(|p| self.guarded(p.as_ref(), p.publish(event))),
        )
        .await;

        let report = PublishReport { outcomes };
        self.log_report(&report, &event.id.to_string(), event.sequence_number);
        Ok(report)
    }

    /// Deliver a batch to every provider through its `publish_batch`
    ///
    /// An empty batch is a no-op.
    pub async fn publish_batch(&self, events: &[DomainEvent]) -> Result<PublishReport> {
        validate_batch(events)?;
        let Some(first) = events.first() else {
            return Ok(PublishReport::default());
        };

        let outcomes = join_all(
            self.providers
                .iter()
                .map(|p| self.guarded(p.as_ref(), p.publish_batch(events))),
        )
        .await;

        let report = PublishReport { outcomes };
        self.log_report(&report, &first.id.to_string(), first.sequence_number);
        Ok(report)
    }

    /// Health of each provider, keyed by name
    ///
    /// A probe that does not answer within the publish timeout reports
    /// `false`.
    pub async fn health_status(&self) -> HashMap<String, bool> {
        let timeout = self.publish_timeout();
        let checks = self.providers.iter().map(|p| async move {
            let healthy = tokio::time::timeout(timeout, AssertUnwindSafe(p.health()).catch_unwind())
                .await
                .map(|r| r.unwrap_or(false))
                .unwrap_or(false);
            (p.name().to_string(), healthy)
        });
        join_all(checks).await.into_iter().collect()
    }

    /// Close every provider; failures are logged, never raised
    pub async fn close(&self) {
        let closes = self.providers.iter().map(|p| async move {
            if let Err(e) = p.close().await {
                tracing::warn!(provider = p.name(), error = %e, "Failed to close provider");
            }
        });
        join_all(closes).await;
    }

    /// Run one provider call under the timeout and capture its outcome
    async fn guarded<F>(&self, provider: &dyn EventProvider, call: F) -> ProviderOutcome
    where
        F: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let result =
            tokio::time::timeout(self.publish_timeout(), AssertUnwindSafe(call).catch_unwind())
                .await;

        let outcome = match result {
            Ok(Ok(Ok(()))) => DeliveryOutcome::Delivered,
            Ok(Ok(Err(e))) => DeliveryOutcome::Failed(e.to_string()),
            Ok(Err(_panic)) => DeliveryOutcome::Failed("provider panicked".to_string()),
            Err(_) => DeliveryOutcome::TimedOut,
        };

        ProviderOutcome {
            provider: provider.name().to_string(),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    fn log_report(&self, report: &PublishReport, event_id: &str, sequence: u64) {
        for o in &report.outcomes {
            match &o.outcome {
                DeliveryOutcome::Delivered => tracing::debug!(
                    provider = %o.provider,
                    event_id,
                    sequence,
                    elapsed_ms = o.elapsed.as_millis() as u64,
                    "Event delivered"
                ),
                DeliveryOutcome::TimedOut => tracing::warn!(
                    provider = %o.provider,
                    event_id,
                    sequence,
                    timeout_ms = self.config.publish_timeout_ms,
                    "Event delivery timed out"
                ),
                DeliveryOutcome::Failed(reason) => tracing::warn!(
                    provider = %o.provider,
                    event_id,
                    sequence,
                    error = %reason,
                    "Event delivery failed"
                ),
            }
        }
    }
}

async fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn EventProvider>> {
    let name = config.name().to_string();
    Ok(match &config.kind {
        ProviderKind::Queue(c) => Arc::new(QueueProvider::connect(name, c.clone()).await?),
        ProviderKind::Webhook(c) => Arc::new(WebhookProvider::new(name, c.clone())?),
        ProviderKind::File(c) => Arc::new(FileLogProvider::open(name, c.clone()).await?),
        ProviderKind::Memory(c) => Arc::new(InMemoryProvider::new(name, c.clone())),
    })
}
