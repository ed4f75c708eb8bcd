use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProjectId;

/// The unit of event aggregation, keyed by fingerprint within a project.
///
/// A group owns its events by back-reference only: membership is derived
/// from `StoredEvent::group_id`, never from a list held here, so the record
/// is immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub fingerprint: String,
}
