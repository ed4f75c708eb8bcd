use common_types::{Group, ProjectId};
use metrics::counter;
use tracing::debug;

use crate::error::UnhandledError;
use crate::metric_consts::{GROUPING_CONFLICTS, GROUPS_CREATED};
use crate::store::EventStore;

/// Resolves a fingerprint to its group, creating the group if this is the
/// first event to carry it. Concurrent resolutions for the same
/// (project, fingerprint) converge on a single group: creation races lose
/// against the first writer and pick up the winner on the next lookup, so a
/// conflict never escapes this function.
pub async fn resolve_group(
    store: &(dyn EventStore + Send + Sync),
    project_id: ProjectId,
    fingerprint: &str,
) -> Result<Group, UnhandledError> {
    loop {
        if let Some(group) = store.find_group(project_id, fingerprint).await? {
            return Ok(group);
        }

        if let Some(group) = store.try_create_group(project_id, fingerprint).await? {
            debug!(group = %group.id, project = project_id, "created group");
            counter!(GROUPS_CREATED).increment(1);
            return Ok(group);
        }

        // Lost the creation race; the winner is visible on the next lookup.
        counter!(GROUPING_CONFLICTS).increment(1);
    }
}
