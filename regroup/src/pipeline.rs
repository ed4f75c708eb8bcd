use common_types::StoredEvent;
use metrics::counter;
use tracing::{debug, warn};

use crate::app_context::AppContext;
use crate::error::{EventError, PipelineResult, UnhandledError};
use crate::fingerprinting::resolve_fingerprint;
use crate::grouping::resolve_group;
use crate::metric_consts::{DROPPED_EVENTS, EVENT_PROCESSED};
use crate::preprocessing::run_chain;

/// Runs one event through the full ingestion pipeline: raw payload out of
/// the processing cache, preprocessor chain, group resolution, durable
/// write, cache cleanup. The stages are strictly sequential for a single
/// event but share nothing with other jobs, so distinct events process fully
/// in parallel.
pub async fn process_event(
    context: &AppContext,
    cache_key: &str,
) -> Result<PipelineResult, UnhandledError> {
    let payload = match context.processing_store.fetch(cache_key).await? {
        Ok(payload) => payload,
        Err(e) => return Ok(Err(e)),
    };

    // Snapshot before any preprocessor touches the payload. This is what the
    // store retains and what reprocessing re-derives from.
    let original = payload.clone();

    // Fresh lookup on every run, so newly enabled or disabled preprocessors
    // take effect on the next job without a restart.
    let preprocessors = context
        .preprocessors
        .enabled_preprocessors(payload.project_id);
    let processed = run_chain(payload, &preprocessors);

    let fingerprint = resolve_fingerprint(&processed);
    let group = resolve_group(context.store.as_ref(), processed.project_id, &fingerprint).await?;

    let event = StoredEvent {
        event_id: processed.event_id,
        project_id: processed.project_id,
        group_id: group.id,
        timestamp: processed.timestamp,
        data: processed,
    };

    context.store.insert(event.clone(), &original).await?;
    context.processing_store.delete(cache_key).await?;

    debug!(event = %event.event_id, group = %event.group_id, "event stored");
    counter!(EVENT_PROCESSED).increment(1);

    Ok(Ok(event))
}

/// Accounting for events the pipeline dropped. Anything recoverable never
/// reaches here - it's annotated onto the stored payload instead.
pub fn report_dropped(error: &EventError) {
    match error {
        EventError::CacheMiss(_) => {
            // The raw payload expired or was never written. The event is
            // gone; retrying cannot bring it back.
            warn!("{}", error);
            counter!(DROPPED_EVENTS, "reason" => "cache_miss").increment(1);
        }
        EventError::FailedToDeserialize(_, _) => {
            // A corrupt cache entry implies a writer bug, so shout louder.
            warn!("{}", error);
            counter!(DROPPED_EVENTS, "reason" => "failed_to_deserialize").increment(1);
        }
        EventError::MissingOriginalPayload(_) => {
            // Reprocessing found a member without a retained original. The
            // event keeps its current group assignment.
            warn!("{}", error);
            counter!(DROPPED_EVENTS, "reason" => "missing_original").increment(1);
        }
    }
}
