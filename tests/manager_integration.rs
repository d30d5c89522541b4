//! EventManager integration tests
//!
//! End-to-end fan-out through real providers: in-memory buffer, file
//! log and a mocked webhook endpoint. Covers failure isolation, gap
//! handling, concurrency and configuration-driven startup.

use dicom_event::{
    DeliveryOutcome, DomainEvent, EventManager, EventType, FileLogConfig, FileLogProvider,
    InMemoryProvider, InstanceRef, ManagerConfig, ProviderConfig, RetryPolicy, WebhookConfig,
    WebhookProvider,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dicom-event-it-{}", uuid::Uuid::new_v4()))
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).expect("every line is complete JSON"))
        .collect()
}

fn instance_event(event_type: EventType, seq: u64) -> DomainEvent {
    let instance = InstanceRef::new("1.2.840.113619", "1.2.840.113619.2", format!("1.2.840.113619.2.{}", seq));
    DomainEvent::for_instance(event_type, &instance, "dicom-test-host", seq)
}

fn fast_failing_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: 10,
        attempt_timeout_ms: 1000,
        jitter: false,
    }
}

// ─── End-to-end ──────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_webhook_does_not_affect_memory_provider() {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let capture = capture.clone();
            move || capture.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let memory = Arc::new(InMemoryProvider::default());
    let webhook = WebhookProvider::new(
        "pacs-webhook",
        WebhookConfig {
            url: server.uri(),
            retry: fast_failing_policy(),
            ..Default::default()
        },
    )
    .unwrap();

    let manager = EventManager::new(ManagerConfig::default())
        .with_provider(webhook)
        .with_shared_provider(memory.clone());

    let event = instance_event(EventType::ImageCreated, 42);
    let report = manager.publish(&event).await.expect("publish never fails on delivery errors");

    assert_eq!(report.failed(), vec!["pacs-webhook"]);
    assert_eq!(report.outcome("memory"), Some(&DeliveryOutcome::Delivered));

    let stored = memory.events().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, event.id);
    assert_eq!(stored[0].sequence_number, 42);

    let logs = capture.contents();
    assert!(logs.contains("WARN"));
    assert!(logs.contains("Event delivery failed"));
    assert!(logs.contains("pacs-webhook"));
}

#[tokio::test]
async fn test_sequence_gaps_published_as_received() {
    let dir = temp_dir();
    let path = dir.join("events.jsonl");

    let memory = Arc::new(InMemoryProvider::default());
    let manager = EventManager::new(ManagerConfig::default())
        .with_shared_provider(memory.clone())
        .with_provider(
            FileLogProvider::open("audit", FileLogConfig { path: path.clone() })
                .await
                .unwrap(),
        );

    for seq in [1, 2, 4] {
        let report = manager.publish(&instance_event(EventType::ImageCreated, seq)).await.unwrap();
        assert!(report.is_success());
    }

    let seqs: Vec<u64> = memory.events().await.iter().map(|e| e.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 4]);

    let logged: Vec<u64> = read_lines(&path)
        .iter()
        .map(|l| l["data"]["sequenceNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(logged, vec![1, 2, 4]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_file_log_carries_wire_envelope() {
    let dir = temp_dir();
    let path = dir.join("events.jsonl");
    let manager = EventManager::new(ManagerConfig::default()).with_provider(
        FileLogProvider::open("audit", FileLogConfig { path: path.clone() })
            .await
            .unwrap(),
    );

    let event = instance_event(EventType::ImageDeleted, 7);
    manager.publish(&event).await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["id"], event.id.to_string());
    assert_eq!(line["eventType"], "Microsoft.HealthcareApis.DicomImageDeleted");
    assert_eq!(line["subject"], event.subject);
    assert_eq!(line["dataVersion"], "1");
    assert_eq!(line["metadataVersion"], "1");
    assert_eq!(line["topic"], "dicom-test-host");
    assert_eq!(line["data"]["imageSopInstanceUid"], "1.2.840.113619.2.7");
    assert_eq!(line["data"]["sequenceNumber"], 7);

    std::fs::remove_dir_all(&dir).unwrap();
}

// ─── Concurrency ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publish_50_tasks() {
    let dir = temp_dir();
    let path = dir.join("events.jsonl");

    let memory = Arc::new(InMemoryProvider::default());
    let manager = Arc::new(
        EventManager::new(ManagerConfig::default())
            .with_shared_provider(memory.clone())
            .with_provider(
                FileLogProvider::open("audit", FileLogConfig { path: path.clone() })
                    .await
                    .unwrap(),
            ),
    );

    let mut handles = Vec::new();
    for seq in 0..50 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .publish(&instance_event(EventType::ImageUpdated, seq))
                .await
                .unwrap()
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_success());
    }

    assert_eq!(memory.len().await, 50);

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 50);
    let mut seqs: Vec<u64> = lines
        .iter()
        .map(|l| l["data"]["sequenceNumber"].as_u64().unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..50).collect::<Vec<u64>>());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fire_and_forget_integration() {
    let memory = Arc::new(InMemoryProvider::default());
    let manager = Arc::new(EventManager::new(ManagerConfig::default()).with_shared_provider(memory.clone()));

    // A write path that does not wait for notifications
    let event = instance_event(EventType::ImageCreated, 1);
    let handle = {
        let manager = manager.clone();
        let event = event.clone();
        tokio::spawn(async move { manager.publish(&event).await })
    };

    handle.await.unwrap().unwrap();
    assert_eq!(memory.get(event.id).await.unwrap().sequence_number, 1);
}

// ─── Batches ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_batch_to_memory_and_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let memory = Arc::new(InMemoryProvider::default());
    let manager = EventManager::new(ManagerConfig::default())
        .with_shared_provider(memory.clone())
        .with_provider(
            WebhookProvider::new(
                "hook",
                WebhookConfig {
                    url: server.uri(),
                    ..Default::default()
                },
            )
            .unwrap(),
        );

    let batch: Vec<DomainEvent> = [10, 11, 13]
        .into_iter()
        .map(|seq| instance_event(EventType::ImageCreated, seq))
        .collect();
    let report = manager.publish_batch(&batch).await.unwrap();
    assert!(report.is_success());
    assert_eq!(memory.len().await, 3);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let seqs: Vec<u64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["data"]["sequenceNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![10, 11, 13]);
}

// ─── Configuration-driven startup ────────────────────────────────

#[tokio::test]
async fn test_from_configs_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = temp_dir();
    let path = dir.join("audit").join("events.jsonl");

    let configs: Vec<ProviderConfig> = serde_json::from_value(serde_json::json!([
        {"type": "webhook", "name": "downstream", "url": server.uri()},
        {"type": "file", "name": "audit", "path": path},
        {"type": "memory", "name": "debug"},
        {"type": "queue", "name": "work-queue", "enabled": false}
    ]))
    .unwrap();

    let manager = EventManager::from_configs(ManagerConfig::default(), &configs)
        .await
        .unwrap();
    assert_eq!(manager.provider_names(), vec!["downstream", "audit", "debug"]);

    let report = manager
        .publish(&instance_event(EventType::ImageCreated, 1))
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(read_lines(&path).len(), 1);

    let health = manager.health_status().await;
    assert_eq!(health.len(), 3);
    assert!(health.values().all(|ok| *ok));

    manager.close().await;
    let health = manager.health_status().await;
    assert!(!health["audit"]);
    assert!(!health["debug"]);

    std::fs::remove_dir_all(&dir).unwrap();
}
