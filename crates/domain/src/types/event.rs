//! Audit event envelope
//!
//! Events are an open JSON payload plus a metadata block. The metadata keeps
//! a handful of typed fields the event store relies on and carries everything
//! else (machine snapshots, observer, probes, tags, request) in `extra`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata block attached to every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: Uuid,
    /// Position of the event inside the request or batch that produced it
    #[serde(default)]
    pub index: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_serial_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventMetadata {
    /// Namespace the payload is stored under: the explicit one, else the type.
    pub fn effective_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.event_type)
    }
}

/// Domain event: metadata plus the event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub metadata: EventMetadata,
    pub payload: Map<String, Value>,
}

impl Event {
    /// New event of `event_type` created now, with a fresh id.
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            metadata: EventMetadata {
                id: Uuid::new_v4(),
                index: 0,
                created_at: Utc::now(),
                event_type: event_type.into(),
                namespace: None,
                machine_serial_number: None,
                extra: Map::new(),
            },
            payload,
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.metadata.machine_serial_number = Some(serial_number.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = Some(namespace.into());
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.metadata.index = index;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.metadata.created_at = created_at;
        self
    }

    /// Attach an extra metadata field (`machine`, `observer`, `probes`, ...).
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey { id: self.metadata.id, index: self.metadata.index }
    }
}

/// `(event id, index)` pair identifying a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub id: Uuid,
    pub index: u64,
}

/// Query window; an open end means "until now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(from: DateTime<Utc>) -> Self {
        Self { from, to: None }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to: Some(to) }
    }
}
