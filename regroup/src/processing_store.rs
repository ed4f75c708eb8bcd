use std::sync::Arc;

use common_redis::{Client, CustomRedisError};
use common_types::{EventPayload, ProjectId};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EventError, UnhandledError};

/// The cache slot an event's raw payload lives in between enqueue and
/// processing. Derived from event identity, never from content, so the same
/// event always maps to the same slot.
pub fn cache_key_for(project_id: ProjectId, event_id: Uuid) -> String {
    format!("e:{}:{}", event_id.as_simple(), project_id)
}

/// Short-lived storage for raw event payloads awaiting processing.
///
/// Entries are written once at enqueue time, read during processing, and
/// explicitly deleted once the event is durably stored. Reprocessing
/// re-populates a slot from the event store's retained original payload.
#[derive(Clone)]
pub struct EventProcessingStore {
    client: Arc<dyn Client + Send + Sync>,
    ttl_seconds: u64,
}

impl EventProcessingStore {
    pub fn new(client: Arc<dyn Client + Send + Sync>, ttl_seconds: u64) -> Self {
        Self {
            client,
            ttl_seconds,
        }
    }

    /// Writes the payload under its identity-derived key and returns the key.
    /// Write-once: a live entry under the same key is left untouched, so
    /// concurrent stores for the same event cannot race each other.
    pub async fn store(&self, payload: &EventPayload) -> Result<String, UnhandledError> {
        let key = cache_key_for(payload.project_id, payload.event_id);
        let encoded = serde_json::to_string(payload)?;
        let written = self
            .client
            .set_nx_ex(key.clone(), encoded, self.ttl_seconds)
            .await?;
        if !written {
            debug!(cache_key = %key, "payload already cached, keeping existing entry");
        }
        Ok(key)
    }

    /// Re-populates a slot from a retained original payload, overwriting any
    /// stale leftover. Only the reprocessing job that fetched the original
    /// writes here, so there is no competing writer to protect against.
    pub async fn restore(&self, payload: &EventPayload) -> Result<String, UnhandledError> {
        let key = cache_key_for(payload.project_id, payload.event_id);
        let encoded = serde_json::to_string(payload)?;
        self.client
            .setex(key.clone(), encoded, self.ttl_seconds)
            .await?;
        Ok(key)
    }

    /// Expired or deleted entries surface as a `CacheMiss`, never as stale
    /// data.
    pub async fn fetch(
        &self,
        cache_key: &str,
    ) -> Result<Result<EventPayload, EventError>, UnhandledError> {
        let raw = match self.client.get(cache_key.to_string()).await {
            Ok(raw) => raw,
            Err(CustomRedisError::NotFound) => {
                return Ok(Err(EventError::CacheMiss(cache_key.to_string())))
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(payload) => Ok(Ok(payload)),
            Err(e) => Ok(Err(EventError::FailedToDeserialize(
                cache_key.to_string(),
                e.to_string(),
            ))),
        }
    }

    pub async fn delete(&self, cache_key: &str) -> Result<(), UnhandledError> {
        self.client.del(cache_key.to_string()).await?;
        Ok(())
    }
}
