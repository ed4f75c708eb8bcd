use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use common_types::{EventPayload, ProjectId};
use metrics::counter;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app_context::AppContext;
use crate::error::UnhandledError;
use crate::metric_consts::{EVENT_RECEIVED, JOBS_ENQUEUED, JOB_RETRIES};
use crate::pipeline::{process_event, report_dropped};
use crate::reprocessing::reprocess_group;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Ingest { cache_key: String },
    ReprocessGroup { project_id: ProjectId, group_id: Uuid },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::Ingest { .. } => "ingest",
            Job::ReprocessGroup { .. } => "reprocess_group",
        }
    }
}

/// The asynchronous substrate ingestion and reprocessing run on: a queue of
/// fire-and-forget jobs plus a pool of workers. Tests skip the workers and
/// call `drain` instead, which runs exactly the enqueued jobs (and whatever
/// they enqueue) to completion, deterministically.
pub struct JobScheduler {
    context: Arc<AppContext>,
    queue: Mutex<VecDeque<Job>>,
    notify: Notify,
    shutting_down: AtomicBool,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutting_down: AtomicBool::new(false),
        })
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Caches the raw payload, then queues an ingestion job for it.
    /// Completion is observed through event store queries, not a return
    /// channel.
    pub async fn enqueue_ingest(&self, payload: &EventPayload) -> Result<String, UnhandledError> {
        counter!(EVENT_RECEIVED).increment(1);
        let cache_key = self.context.processing_store.store(payload).await?;
        self.push(Job::Ingest {
            cache_key: cache_key.clone(),
        });
        Ok(cache_key)
    }

    pub fn enqueue_reprocess(&self, project_id: ProjectId, group_id: Uuid) {
        self.push(Job::ReprocessGroup {
            project_id,
            group_id,
        });
    }

    fn push(&self, job: Job) {
        if self.shutting_down.load(Ordering::SeqCst) {
            warn!(kind = job.kind(), "rejecting job enqueued during shutdown");
            return;
        }
        counter!(JOBS_ENQUEUED, "kind" => job.kind()).increment(1);
        self.lock_queue().push_back(job);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Job> {
        self.lock_queue().pop_front()
    }

    /// Test/debug mode: runs every queued job, including jobs enqueued by
    /// running jobs, to completion before returning.
    pub async fn drain(&self) -> Result<(), UnhandledError> {
        while let Some(job) = self.pop() {
            self.run_job(job).await?;
        }
        Ok(())
    }

    /// Spawns the worker pool. Worker count is the job-level concurrency
    /// cap; each worker runs one job at a time.
    pub fn run_workers(self: Arc<Self>, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|index| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.worker_loop(index).await })
            })
            .collect()
    }

    /// Stops workers from picking up further jobs. In-flight jobs run to
    /// completion; there is no cancellation.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn worker_loop(&self, index: usize) {
        let poll_interval = Duration::from_secs(self.context.config.job_poll_interval_seconds);
        info!(worker = index, "worker started");

        loop {
            match self.pop() {
                Some(job) => {
                    let kind = job.kind();
                    if let Err(e) = self.run_job(job).await {
                        // Attempts exhausted. The job is dropped; store
                        // writes being idempotent means a partial run left
                        // nothing inconsistent behind.
                        error!(worker = index, kind, "job failed: {}", e);
                    }
                }
                None if self.shutting_down.load(Ordering::SeqCst) => break,
                None => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        info!(worker = index, "worker stopped");
    }

    async fn run_job(&self, job: Job) -> Result<(), UnhandledError> {
        let attempts = self.context.config.job_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.execute(&job).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        kind = job.kind(),
                        attempt, "retrying failed job: {}", e
                    );
                    counter!(JOB_RETRIES, "kind" => job.kind()).increment(1);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<(), UnhandledError> {
        match job {
            Job::Ingest { cache_key } => {
                match process_event(&self.context, cache_key).await? {
                    Ok(event) => debug!(event = %event.event_id, "ingestion job finished"),
                    Err(event_error) => report_dropped(&event_error),
                }
                Ok(())
            }
            Job::ReprocessGroup {
                project_id,
                group_id,
            } => {
                reprocess_group(self.context.clone(), *project_id, *group_id).await?;
                Ok(())
            }
        }
    }
}
