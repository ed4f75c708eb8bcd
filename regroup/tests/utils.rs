use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use common_redis::InMemoryRedisClient;
use common_types::{EventPayload, Group, ProjectId, StoredEvent};
use uuid::Uuid;

use regroup::app_context::AppContext;
use regroup::config::Config;
use regroup::error::UnhandledError;
use regroup::preprocessing::{Preprocessor, PreprocessorRegistry};
use regroup::scheduler::JobScheduler;
use regroup::store::{EventFilter, EventStore, MemoryEventStore};

pub struct TestHarness {
    pub scheduler: Arc<JobScheduler>,
    pub context: Arc<AppContext>,
    pub registry: Arc<PreprocessorRegistry>,
    pub cache: InMemoryRedisClient,
}

#[allow(dead_code)]
pub fn test_harness() -> TestHarness {
    test_harness_with_store(Arc::new(MemoryEventStore::new()))
}

pub fn test_harness_with_store(store: Arc<dyn EventStore + Send + Sync>) -> TestHarness {
    let config = Config::init_with_defaults().unwrap();
    let cache = InMemoryRedisClient::new();
    let registry = Arc::new(PreprocessorRegistry::new());

    let context = Arc::new(AppContext::with_parts(
        config,
        Arc::new(cache.clone()),
        store,
        registry.clone(),
    ));
    let scheduler = JobScheduler::new(context.clone());

    TestHarness {
        scheduler,
        context,
        registry,
        cache,
    }
}

#[allow(dead_code)]
pub fn normalized_event(project_id: ProjectId) -> EventPayload {
    EventPayload::new(project_id, Utc::now())
}

/// The preprocessor the original-data property hinges on: it refuses to run
/// on a payload that already carries its tag, so it only ever passes when the
/// pipeline feeds it the clean original rather than a previously derived
/// copy. Appends `processing_counter=x<n>` and sets the fingerprint - fixed
/// when `change_groups` is false, randomized per run when true.
#[allow(dead_code)]
pub fn counting_preprocessor(counter: Arc<AtomicUsize>, change_groups: bool) -> Preprocessor {
    Preprocessor::new("processing_counter", move |mut payload: EventPayload| {
        if payload.tag("processing_counter").is_some() {
            return Err("processing_counter already present in input".to_string());
        }
        let n = counter.fetch_add(1, Ordering::SeqCst);
        payload.set_tag("processing_counter", format!("x{n}"));
        payload.fingerprint = Some(vec![if change_groups {
            Uuid::new_v4().as_simple().to_string()
        } else {
            "foo".to_string()
        }]);
        Ok(payload)
    })
}

/// Store wrapper that fails `insert` a configured number of times for chosen
/// events, for exercising retry and per-event isolation paths.
pub struct FlakyEventStore {
    inner: MemoryEventStore,
    failures_remaining: Mutex<HashSet<Uuid>>,
    insert_attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyEventStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryEventStore::new(),
            failures_remaining: Mutex::new(HashSet::new()),
            insert_attempts: AtomicUsize::new(0),
        }
    }

    /// The next insert for `event_id` fails; later ones go through.
    pub fn fail_next_insert_for(&self, event_id: Uuid) {
        self.failures_remaining.lock().unwrap().insert(event_id);
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for FlakyEventStore {
    async fn insert(
        &self,
        event: StoredEvent,
        original: &EventPayload,
    ) -> Result<(), UnhandledError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_remaining
            .lock()
            .unwrap()
            .remove(&event.event_id)
        {
            return Err(UnhandledError::StoreWrite(
                "synthetic write failure".to_string(),
            ));
        }
        self.inner.insert(event, original).await
    }

    async fn get_by_id(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<StoredEvent>, UnhandledError> {
        self.inner.get_by_id(project_id, event_id).await
    }

    async fn get_original_payload(
        &self,
        project_id: ProjectId,
        event_id: Uuid,
    ) -> Result<Option<EventPayload>, UnhandledError> {
        self.inner.get_original_payload(project_id, event_id).await
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, UnhandledError> {
        self.inner.query(filter).await
    }

    async fn find_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError> {
        self.inner.find_group(project_id, fingerprint).await
    }

    async fn try_create_group(
        &self,
        project_id: ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Group>, UnhandledError> {
        self.inner.try_create_group(project_id, fingerprint).await
    }

    async fn get_group(
        &self,
        project_id: ProjectId,
        group_id: Uuid,
    ) -> Result<Option<Group>, UnhandledError> {
        self.inner.get_group(project_id, group_id).await
    }
}
