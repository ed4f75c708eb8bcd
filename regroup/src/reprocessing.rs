use std::sync::Arc;

use common_types::ProjectId;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_context::AppContext;
use crate::error::{EventError, PipelineResult, UnhandledError};
use crate::metric_consts::{REPROCESSED_EVENTS, REPROCESSING_RUNS};
use crate::pipeline::process_event;
use crate::store::EventFilter;

/// Outcome of one group reprocessing run. Failures are per-event and never
/// abort the rest of the batch; callers translate this into whatever status
/// their boundary needs.
#[derive(Debug)]
pub struct ReprocessingReport {
    pub group_id: Uuid,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<(Uuid, String)>,
}

/// Re-runs the full pipeline for every event currently assigned to a group.
///
/// Membership is a point-in-time snapshot: events ingested into the group
/// after the enumerating query are handled by their own ingestion jobs, and
/// new ingestion is never blocked while a run is in flight. Each member is
/// re-derived from the store's retained original payload - never from the
/// already-tagged copy - so running this twice with unchanged rules is a
/// no-op for every member's group assignment. Event ids are never touched;
/// group ids may change when fingerprint inputs diverge.
pub async fn reprocess_group(
    context: Arc<AppContext>,
    project_id: ProjectId,
    group_id: Uuid,
) -> Result<ReprocessingReport, UnhandledError> {
    counter!(REPROCESSING_RUNS).increment(1);

    let members = context
        .store
        .query(&EventFilter::for_project(project_id).with_group(group_id))
        .await?;
    let requested = members.len();

    let semaphore = Arc::new(Semaphore::new(context.config.max_concurrent_reprocessing));
    let mut set = JoinSet::new();

    for member in members {
        let context = context.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("reprocessing semaphore is never closed");
            let event_id = member.event_id;
            let result = reprocess_event(&context, member.project_id, event_id).await;
            (event_id, result)
        });
    }

    let mut succeeded = 0;
    let mut failed = Vec::new();

    while let Some(joined) = set.join_next().await {
        let (event_id, result) = joined?;
        match result {
            Ok(Ok(_)) => {
                succeeded += 1;
                counter!(REPROCESSED_EVENTS, "outcome" => "success").increment(1);
            }
            Ok(Err(event_error)) => {
                warn!(event = %event_id, "reprocessing dropped event: {}", event_error);
                counter!(REPROCESSED_EVENTS, "outcome" => "dropped").increment(1);
                failed.push((event_id, event_error.to_string()));
            }
            // Per-event isolation holds for job-level failures too: one
            // member's store outage must not abort the remaining members.
            Err(unhandled) => {
                warn!(event = %event_id, "reprocessing failed for event: {}", unhandled);
                counter!(REPROCESSED_EVENTS, "outcome" => "failed").increment(1);
                failed.push((event_id, unhandled.to_string()));
            }
        }
    }

    let report = ReprocessingReport {
        group_id,
        requested,
        succeeded,
        failed,
    };
    info!(
        group = %group_id,
        requested = report.requested,
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "group reprocessing finished"
    );
    Ok(report)
}

/// One member's trip back through the pipeline: recover the retained
/// original payload, put it back in the processing cache under the event's
/// slot, and run ingestion against the current preprocessors and grouping
/// rules.
async fn reprocess_event(
    context: &AppContext,
    project_id: ProjectId,
    event_id: Uuid,
) -> Result<PipelineResult, UnhandledError> {
    let Some(original) = context
        .store
        .get_original_payload(project_id, event_id)
        .await?
    else {
        return Ok(Err(EventError::MissingOriginalPayload(event_id)));
    };

    let cache_key = context.processing_store.restore(&original).await?;
    process_event(context, &cache_key).await
}
