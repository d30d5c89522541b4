//! Webhook provider with bounded retry
//!
//! POSTs the wire envelope to a configured URL. `publish` sends a single
//! JSON object, `publish_batch` sends a JSON array in one request so the
//! endpoint accepts or rejects the batch as a whole.
//!
//! Connection failures, timeouts and 5xx responses are retried per the
//! configured `RetryPolicy`. Any other non-2xx response is a permanent
//! rejection: logged, dropped, never retried.

use crate::error::{EventError, Result};
use crate::provider::EventProvider;
use crate::retry::RetryPolicy;
use crate::types::{DomainEvent, WireEvent};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Webhook provider configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Endpoint receiving the POSTs (http or https)
    pub url: String,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| EventError::Config(format!("invalid webhook url '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EventError::Config(format!(
                "webhook url '{}' must use http or https",
                self.url
            )));
        }
        build_headers(&self.headers)?;
        self.retry.validate()
    }
}

fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| EventError::Config(format!("invalid webhook header '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            EventError::Config(format!("invalid value for webhook header '{}': {}", key, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Provider delivering events to an HTTP endpoint
pub struct WebhookProvider {
    name: String,
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl WebhookProvider {
    /// Build the provider and its HTTP client
    pub fn new(name: impl Into<String>, config: WebhookConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.retry.attempt_timeout())
            .default_headers(build_headers(&config.headers)?)
            .build()
            .map_err(|e| EventError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            url: config.url,
            client,
            policy: config.retry,
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upper bound on the time one `publish` call can take
    pub fn worst_case_latency(&self) -> Duration {
        self.policy.worst_case_latency()
    }

    /// Send `body`, retrying transient failures per the policy
    async fn deliver(&self, body: Bytes, event_id: &str) -> Result<()> {
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.try_send(body.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(
                            provider = %self.name,
                            event_id,
                            attempt,
                            "Webhook delivered after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        provider = %self.name,
                        event_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                    last_err = Some(e);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %self.name,
                        event_id,
                        attempt,
                        error = %e,
                        "Webhook rejected event permanently, dropping"
                    );
                    return Err(e);
                }
            }
        }

        tracing::error!(
            provider = %self.name,
            event_id,
            attempts = self.policy.max_attempts,
            "Webhook delivery failed after all retries"
        );
        Err(last_err.unwrap_or_else(|| EventError::Transient {
            destination: self.url.clone(),
            reason: "no delivery attempt was made".to_string(),
        }))
    }

    /// Execute a single POST and classify the result
    async fn try_send(&self, body: Bytes) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(256)
            .collect::<String>();

        if status.is_server_error() {
            Err(EventError::Transient {
                destination: self.url.clone(),
                reason: format!("HTTP {}: {}", status.as_u16(), reason),
            })
        } else {
            Err(EventError::Rejected {
                destination: self.url.clone(),
                status: status.as_u16(),
                reason,
            })
        }
    }

    fn classify_transport(&self, e: reqwest::Error) -> EventError {
        if e.is_timeout() {
            EventError::Timeout(format!(
                "webhook {} did not answer within {:?}",
                self.url,
                self.policy.attempt_timeout()
            ))
        } else {
            EventError::Transient {
                destination: self.url.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl EventProvider for WebhookProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let body = Bytes::from(WireEvent::encode(event)?);
        self.deliver(body, &event.id.to_string()).await
    }

    async fn publish_batch(&self, events: &[DomainEvent]) -> Result<()> {
        let body = Bytes::from(WireEvent::encode_batch(events)?);
        let label = match events.first() {
            Some(first) => format!("{} (+{} more)", first.id, events.len() - 1),
            None => String::new(),
        };
        self.deliver(body, &label).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> WebhookConfig {
        WebhookConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_with_valid_config() {
        let provider = WebhookProvider::new("hook", config("https://example.com/events")).unwrap();
        assert_eq!(provider.name(), "hook");
        assert_eq!(provider.url(), "https://example.com/events");
        assert_eq!(provider.worst_case_latency(), Duration::from_millis(3600));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            WebhookProvider::new("hook", config("not a url")),
            Err(EventError::Config(_))
        ));
        assert!(matches!(
            WebhookProvider::new("hook", config("ftp://example.com")),
            Err(EventError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_header() {
        let mut cfg = config("https://example.com");
        cfg.headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(cfg.validate(), Err(EventError::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_retry_policy() {
        let mut cfg = config("https://example.com");
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_deserialization() {
        let cfg: WebhookConfig = serde_json::from_str(
            r#"{
                "url": "https://hooks.example.com/dicom",
                "headers": {"aeg-sas-key": "secret"},
                "retry": {"maxAttempts": 5, "jitter": false}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.headers["aeg-sas-key"], "secret");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!(!cfg.retry.jitter);
        assert!(cfg.validate().is_ok());
    }
}
