use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ProjectId;

/// The normalized event payload that flows through the processing pipeline.
///
/// Identity fields are plain struct fields: a preprocessor receives and
/// returns a payload by value, so it can add, overwrite or remove tags,
/// fingerprints and annotations, but structurally cannot drop `event_id` or
/// `project_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    pub event_id: Uuid,
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Ordered key/value pairs, preserved as-is across the cache and store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<(String, String)>,
    /// Explicit grouping override. When absent the grouping engine derives a
    /// fingerprint from the payload content instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Vec<String>>,
    /// Processing diagnostics. Non-empty marks a best-effort record whose
    /// preprocessor chain did not run to completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Pipeline-added annotations that don't warrant a typed field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventPayload {
    /// A freshly normalized payload with a new time-ordered event id.
    pub fn new(project_id: ProjectId, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            project_id,
            timestamp,
            message: None,
            tags: Vec::new(),
            fingerprint: None,
            errors: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces an existing tag in place, or appends. Keeps tag order stable
    /// so repeated processing doesn't shuffle the sequence.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    pub fn push_error(&mut self, error: impl ToString) {
        self.errors.push(error.to_string());
    }
}

/// A finalized event as held by the event store. `group_id` is the only
/// field that may change across reprocessing runs; `event_id` never does.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub project_id: ProjectId,
    pub group_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: EventPayload,
}
