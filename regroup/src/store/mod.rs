use async_trait::async_trait;
use common_types::{EventPayload, Group, ProjectId, StoredEvent};
use uuid::Uuid;

use crate::error::UnhandledError;

mod memory;

pub use memory::MemoryEventStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagOperator {
    Eq,
    NotEq,
}

#[derive(Clone, Debug)]
pub struct TagCondition {
    pub key: String,
    pub op: TagOperator,
    pub value: String,
}

impl TagCondition {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let actual = event.data.tag(&self.key);
        match self.op {
            TagOperator::Eq => actual == Some(self.value.as_str()),
            TagOperator::NotEq => actual != Some(self.value.as_str()),
        }
    }
}

/// Conjunctive query over the event store's secondary indexes, scoped to an
/// explicit project set. Results are materialized once per call; ordering is
/// stable for a fixed underlying state but otherwise unspecified.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    pub project_ids: Vec<ProjectId>,
    pub group_ids: Option<Vec<Uuid>>,
    pub tag_conditions: Vec<TagCondition>,
}

impl EventFilter {
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_ids: vec![project_id],
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_ids.get_or_insert_with(Vec::new).push(group_id);
        self
    }

    pub fn with_tag_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_conditions.push(TagCondition {
            key: key.into(),
            op: TagOperator::Eq,
            value: value.into(),
        });
        self
    }

    pub fn with_tag_not_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_conditions.push(TagCondition {
            key: key.into(),
            op: TagOperator::NotEq,
            value: value.into(),
        });
        self
    }
}

/// Durable, append-only home of finalized events, plus the group registry
/// the grouping engine resolves fingerprints against.
///
/// Writes are idempotent: a retried `insert` for the same event id and
/// identical content is a no-op, and a re-insert with new content supersedes
/// the old record (one record per event id, re-indexed). The payload passed
/// as `original` is retained on first insert and never overwritten, so
/// reprocessing always recovers a clean, pre-preprocessor input.
#[async_trait]
pub trait EventStore {
    async fn insert(
        &self,
        event: StoredEvent,
        original: &EventPayload,
    ) -> Result<(), UnhandledError>;

    async fn get_by_id(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<StoredEvent>, UnhandledError>;

    async fn get_original_payload(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<EventPayload>, UnhandledError>;

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, UnhandledError>;

    async fn find_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError>;

    /// Atomically registers a new group for `(project_id, fingerprint)`.
    /// Returns `None` when another creator won the race; the winner's group
    /// is visible through `find_group` afterwards (first-writer-wins).
    async fn try_create_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError>;

    async fn get_group(
        &self,
        project_id: ProjectId,
        group_id: Uuid,
    ) -> Result<Option<Group>, UnhandledError>;
}
