//! Core event types for the dicom-event system
//!
//! All types use camelCase JSON serialization for wire compatibility.

use crate::error::{EventError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Default payload schema version for new events
pub const DEFAULT_SCHEMA_VERSION: &str = "1";

/// Default envelope metadata version for new events
pub const DEFAULT_METADATA_VERSION: &str = "1";

/// Payload key reserved for the sequence number in the wire envelope
pub const SEQUENCE_NUMBER_KEY: &str = "sequenceNumber";

/// Kind of storage mutation an event describes
///
/// Serialized with the fully-qualified names consumers of the
/// cloud DICOM API already subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventType {
    #[serde(rename = "Microsoft.HealthcareApis.DicomImageCreated")]
    ImageCreated,
    #[serde(rename = "Microsoft.HealthcareApis.DicomImageDeleted")]
    ImageDeleted,
    #[serde(rename = "Microsoft.HealthcareApis.DicomImageUpdated")]
    ImageUpdated,
}

impl EventType {
    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ImageCreated => "Microsoft.HealthcareApis.DicomImageCreated",
            EventType::ImageDeleted => "Microsoft.HealthcareApis.DicomImageDeleted",
            EventType::ImageUpdated => "Microsoft.HealthcareApis.DicomImageUpdated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one stored DICOM instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub study_uid: String,
    pub series_uid: String,
    pub sop_uid: String,
}

impl InstanceRef {
    pub fn new(
        study_uid: impl Into<String>,
        series_uid: impl Into<String>,
        sop_uid: impl Into<String>,
    ) -> Self {
        Self {
            study_uid: study_uid.into(),
            series_uid: series_uid.into(),
            sop_uid: sop_uid.into(),
        }
    }

    /// Resource path naming this instance
    pub fn subject(&self) -> String {
        format!(
            "/studies/{}/series/{}/instances/{}",
            self.study_uid, self.series_uid, self.sop_uid
        )
    }
}

/// A single notable occurrence in the storage service
///
/// Built once by the storage operation that committed the change and
/// shared read-only with every provider during fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Unique event identifier (UUIDv4)
    pub id: Uuid,

    /// What happened
    pub event_type: EventType,

    /// Hierarchical resource path of the affected object
    pub subject: String,

    /// When the mutation committed
    pub occurred_at: DateTime<Utc>,

    /// Version of the payload shape
    pub schema_version: String,

    /// Version of the envelope metadata
    pub metadata_version: String,

    /// Event payload; must be a JSON object
    pub payload: serde_json::Value,

    /// Identifier of the emitting service instance
    pub origin: String,

    /// Change-feed sequence number assigned by the storage layer
    pub sequence_number: u64,
}

impl DomainEvent {
    /// Create a new event with auto-generated id and timestamp
    pub fn new(
        event_type: EventType,
        subject: impl Into<String>,
        payload: serde_json::Value,
        origin: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            subject: subject.into(),
            occurred_at: Utc::now(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            metadata_version: DEFAULT_METADATA_VERSION.to_string(),
            payload,
            origin: origin.into(),
            sequence_number,
        }
    }

    /// Create an event for a stored DICOM instance
    ///
    /// The subject is the instance path and the payload carries the three
    /// UIDs plus the emitting host name.
    pub fn for_instance(
        event_type: EventType,
        instance: &InstanceRef,
        origin: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        let origin = origin.into();
        let payload = serde_json::json!({
            "imageStudyInstanceUid": instance.study_uid,
            "imageSeriesInstanceUid": instance.series_uid,
            "imageSopInstanceUid": instance.sop_uid,
            "serviceHostName": origin,
        });
        Self::new(event_type, instance.subject(), payload, origin, sequence_number)
    }

    /// Override the payload schema version
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Override the envelope metadata version
    pub fn with_metadata_version(mut self, version: impl Into<String>) -> Self {
        self.metadata_version = version.into();
        self
    }

    /// Check the structural invariants a caller must uphold
    pub fn validate(&self) -> Result<()> {
        if self.id.is_nil() {
            return Err(EventError::InvalidEvent("id must not be nil".to_string()));
        }
        if !self.subject.starts_with('/') {
            return Err(EventError::InvalidEvent(format!(
                "subject '{}' must be an absolute resource path",
                self.subject
            )));
        }
        if self.subject[1..].split('/').any(str::is_empty) {
            return Err(EventError::InvalidEvent(format!(
                "subject '{}' contains an empty segment",
                self.subject
            )));
        }
        if self.schema_version.trim().is_empty() {
            return Err(EventError::InvalidEvent("schema_version is blank".to_string()));
        }
        if self.metadata_version.trim().is_empty() {
            return Err(EventError::InvalidEvent("metadata_version is blank".to_string()));
        }
        if self.origin.trim().is_empty() {
            return Err(EventError::InvalidEvent("origin is blank".to_string()));
        }
        match &self.payload {
            serde_json::Value::Object(map) if map.contains_key(SEQUENCE_NUMBER_KEY) => {
                Err(EventError::InvalidEvent(format!(
                    "payload must not contain reserved key '{}'",
                    SEQUENCE_NUMBER_KEY
                )))
            }
            serde_json::Value::Object(_) => Ok(()),
            other => Err(EventError::InvalidEvent(format!(
                "payload must be a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }
}

/// Validate every event of a batch and its sequence ordering
///
/// Sequence numbers may skip values but must not regress for the same
/// origin.
pub fn validate_batch(events: &[DomainEvent]) -> Result<()> {
    let mut last_seen: HashMap<&str, u64> = HashMap::new();
    for event in events {
        event.validate()?;
        if let Some(prev) = last_seen.insert(event.origin.as_str(), event.sequence_number) {
            if event.sequence_number < prev {
                return Err(EventError::InvalidEvent(format!(
                    "sequence number regressed for origin '{}': {} after {}",
                    event.origin, event.sequence_number, prev
                )));
            }
        }
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// External JSON envelope written by the queue, webhook and file providers
///
/// Field names and nesting are relied on by downstream consumers and
/// must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub id: String,
    pub event_type: String,
    pub subject: String,
    pub event_time: DateTime<Utc>,
    pub data_version: String,
    pub metadata_version: String,
    pub topic: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl From<&DomainEvent> for WireEvent {
    fn from(event: &DomainEvent) -> Self {
        let mut data = match &event.payload {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        data.insert(
            SEQUENCE_NUMBER_KEY.to_string(),
            serde_json::Value::from(event.sequence_number),
        );

        Self {
            id: event.id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            subject: event.subject.clone(),
            event_time: event.occurred_at,
            data_version: event.schema_version.clone(),
            metadata_version: event.metadata_version.clone(),
            topic: event.origin.clone(),
            data,
        }
    }
}

impl WireEvent {
    /// Serialize a single event to its wire JSON bytes
    pub fn encode(event: &DomainEvent) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&WireEvent::from(event))?)
    }

    /// Serialize a batch of events to a JSON array of wire envelopes
    pub fn encode_batch(events: &[DomainEvent]) -> Result<Vec<u8>> {
        let wire: Vec<WireEvent> = events.iter().map(WireEvent::from).collect();
        Ok(serde_json::to_vec(&wire)?)
    }
}
