use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use common_types::{EventPayload, Group, ProjectId, StoredEvent};
use tracing::debug;
use uuid::Uuid;

use crate::error::UnhandledError;

use super::{EventFilter, EventStore, TagOperator};

#[derive(Default)]
struct Inner {
    events: HashMap<(ProjectId, Uuid), StoredEvent>,
    // First-normalization snapshots; written once, never overwritten.
    originals: HashMap<(ProjectId, Uuid), EventPayload>,
    tag_index: HashMap<(ProjectId, String, String), HashSet<Uuid>>,
    group_index: HashMap<(ProjectId, Uuid), HashSet<Uuid>>,
    groups_by_fingerprint: HashMap<(ProjectId, String), Group>,
    groups_by_id: HashMap<(ProjectId, Uuid), Group>,
}

impl Inner {
    fn unindex(&mut self, event: &StoredEvent) {
        for (key, value) in &event.data.tags {
            if let Some(ids) =
                self.tag_index
                    .get_mut(&(event.project_id, key.clone(), value.clone()))
            {
                ids.remove(&event.event_id);
            }
        }
        if let Some(ids) = self.group_index.get_mut(&(event.project_id, event.group_id)) {
            ids.remove(&event.event_id);
        }
    }

    fn index(&mut self, event: &StoredEvent) {
        for (key, value) in &event.data.tags {
            self.tag_index
                .entry((event.project_id, key.clone(), value.clone()))
                .or_default()
                .insert(event.event_id);
        }
        self.group_index
            .entry((event.project_id, event.group_id))
            .or_default()
            .insert(event.event_id);
    }
}

/// The in-process event store. Primary record, tag index, group index and
/// the group registry all live under one mutex, which is what makes group
/// creation exactly-once per (project, fingerprint) without any further
/// coordination.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(
        &self,
        event: StoredEvent,
        original: &EventPayload,
    ) -> Result<(), UnhandledError> {
        let mut inner = self.lock_inner();
        let key = (event.project_id, event.event_id);

        if let Some(existing) = inner.events.get(&key) {
            if *existing == event {
                // Retried write with identical content: nothing to do.
                debug!(event = %event.event_id, "skipping idempotent re-insert");
                return Ok(());
            }
        }
        if let Some(superseded) = inner.events.remove(&key) {
            inner.unindex(&superseded);
        }

        inner
            .originals
            .entry(key)
            .or_insert_with(|| original.clone());
        inner.index(&event);
        inner.events.insert(key, event);
        Ok(())
    }

    async fn get_by_id(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<StoredEvent>, UnhandledError> {
        let inner = self.lock_inner();
        Ok(inner.events.get(&(project_id, event_id)).cloned())
    }

    async fn get_original_payload(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<EventPayload>, UnhandledError> {
        let inner = self.lock_inner();
        Ok(inner.originals.get(&(project_id, event_id)).cloned())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, UnhandledError> {
        let inner = self.lock_inner();
        let mut results = Vec::new();

        for &project_id in &filter.project_ids {
            // Narrow the candidate set through an index where one applies,
            // falling back to a project scan otherwise.
            let candidates: HashSet<Uuid> = if let Some(group_ids) = &filter.group_ids {
                group_ids
                    .iter()
                    .filter_map(|gid| inner.group_index.get(&(project_id, *gid)))
                    .flatten()
                    .copied()
                    .collect()
            } else if let Some(eq) = filter
                .tag_conditions
                .iter()
                .find(|c| c.op == TagOperator::Eq)
            {
                inner
                    .tag_index
                    .get(&(project_id, eq.key.clone(), eq.value.clone()))
                    .cloned()
                    .unwrap_or_default()
            } else {
                inner
                    .events
                    .keys()
                    .filter(|(pid, _)| *pid == project_id)
                    .map(|(_, eid)| *eid)
                    .collect()
            };

            for event_id in candidates {
                let Some(event) = inner.events.get(&(project_id, event_id)) else {
                    continue;
                };
                if let Some(group_ids) = &filter.group_ids {
                    if !group_ids.contains(&event.group_id) {
                        continue;
                    }
                }
                if filter.tag_conditions.iter().all(|c| c.matches(event)) {
                    results.push(event.clone());
                }
            }
        }

        // Event ids are time-ordered, which keeps result order stable for a
        // fixed store state.
        results.sort_by_key(|e| e.event_id);
        Ok(results)
    }

    async fn find_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError> {
        let inner = self.lock_inner();
        Ok(inner
            .groups_by_fingerprint
            .get(&(project_id, fingerprint.to_string()))
            .cloned())
    }

    async fn try_create_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError> {
        let mut inner = self.lock_inner();
        let key = (project_id, fingerprint.to_string());
        if inner.groups_by_fingerprint.contains_key(&key) {
            return Ok(None);
        }

        let group = Group {
            id: Uuid::now_v7(),
            project_id,
            fingerprint: fingerprint.to_string(),
        };
        inner.groups_by_fingerprint.insert(key, group.clone());
        inner
            .groups_by_id
            .insert((project_id, group.id), group.clone());
        Ok(Some(group))
    }

    async fn get_group(
        &self,
        project_id: ProjectId,
        group_id: Uuid,
    ) -> Result<Option<Group>, UnhandledError> {
        let inner = self.lock_inner();
        Ok(inner.groups_by_id.get(&(project_id, group_id)).cloned())
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn event_with_tags(project_id: ProjectId, tags: &[(&str, &str)]) -> (StoredEvent, EventPayload) {
        let mut payload = EventPayload::new(project_id, Utc::now());
        for (k, v) in tags {
            payload.set_tag(*k, *v);
        }
        let original = {
            let mut p = payload.clone();
            p.tags.clear();
            p
        };
        let event = StoredEvent {
            event_id: payload.event_id,
            project_id,
            group_id: Uuid::now_v7(),
            timestamp: payload.timestamp,
            data: payload,
        };
        (event, original)
    }

    #[tokio::test]
    async fn insert_is_idempotent_for_identical_content() {
        let store = MemoryEventStore::new();
        let (event, original) = event_with_tags(1, &[("env", "prod")]);

        store.insert(event.clone(), &original).await.unwrap();
        store.insert(event.clone(), &original).await.unwrap();

        let found = store
            .query(&EventFilter::for_project(1).with_tag_eq("env", "prod"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], event);
    }

    #[tokio::test]
    async fn supersede_reindexes_tags_and_groups() {
        let store = MemoryEventStore::new();
        let (mut event, original) = event_with_tags(1, &[("counter", "x0")]);
        store.insert(event.clone(), &original).await.unwrap();

        let old_group = event.group_id;
        event.group_id = Uuid::now_v7();
        event.data.set_tag("counter", "x1");
        store.insert(event.clone(), &original).await.unwrap();

        let by_old_tag = store
            .query(&EventFilter::for_project(1).with_tag_eq("counter", "x0"))
            .await
            .unwrap();
        assert!(by_old_tag.is_empty());

        let by_old_group = store
            .query(&EventFilter::for_project(1).with_group(old_group))
            .await
            .unwrap();
        assert!(by_old_group.is_empty());

        let by_new_tag = store
            .query(&EventFilter::for_project(1).with_tag_eq("counter", "x1"))
            .await
            .unwrap();
        assert_eq!(by_new_tag.len(), 1);
        assert_eq!(by_new_tag[0].event_id, event.event_id);
    }

    #[tokio::test]
    async fn original_payload_survives_supersede() {
        let store = MemoryEventStore::new();
        let (mut event, original) = event_with_tags(1, &[("counter", "x0")]);
        store.insert(event.clone(), &original).await.unwrap();

        event.data.set_tag("counter", "x1");
        let mutated_original = event.data.clone();
        store.insert(event.clone(), &mutated_original).await.unwrap();

        let retained = store
            .get_original_payload(1, event.event_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retained, original);
    }

    #[tokio::test]
    async fn query_conditions_are_conjunctive_and_project_scoped() {
        let store = MemoryEventStore::new();
        let (event_a, orig_a) = event_with_tags(1, &[("env", "prod"), ("handler", "checkout")]);
        let (event_b, orig_b) = event_with_tags(1, &[("env", "prod"), ("handler", "search")]);
        let (event_c, orig_c) = event_with_tags(2, &[("env", "prod"), ("handler", "checkout")]);
        store.insert(event_a.clone(), &orig_a).await.unwrap();
        store.insert(event_b.clone(), &orig_b).await.unwrap();
        store.insert(event_c.clone(), &orig_c).await.unwrap();

        let found = store
            .query(
                &EventFilter::for_project(1)
                    .with_tag_eq("env", "prod")
                    .with_tag_eq("handler", "checkout"),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_id, event_a.event_id);

        let excluded = store
            .query(
                &EventFilter::for_project(1)
                    .with_tag_eq("env", "prod")
                    .with_tag_not_eq("handler", "checkout"),
            )
            .await
            .unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].event_id, event_b.event_id);
    }

    #[tokio::test]
    async fn group_creation_is_first_writer_wins() {
        let store = MemoryEventStore::new();

        let winner = store.try_create_group(1, "fp").await.unwrap().unwrap();
        let loser = store.try_create_group(1, "fp").await.unwrap();
        assert!(loser.is_none());

        let found = store.find_group(1, "fp").await.unwrap().unwrap();
        assert_eq!(found, winner);
        let by_id = store.get_group(1, winner.id).await.unwrap().unwrap();
        assert_eq!(by_id, winner);

        // Same fingerprint in another project is a distinct group.
        let other = store.try_create_group(2, "fp").await.unwrap().unwrap();
        assert_ne!(other.id, winner.id);
        assert!(store.get_group(1, other.id).await.unwrap().is_none());
    }
}
