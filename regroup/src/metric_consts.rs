pub const EVENT_RECEIVED: &str = "event_received";
pub const EVENT_PROCESSED: &str = "event_processed";
pub const DROPPED_EVENTS: &str = "dropped_events";
pub const PREPROCESSOR_ERRORS: &str = "preprocessor_errors";
pub const GROUPS_CREATED: &str = "groups_created";
pub const GROUPING_CONFLICTS: &str = "grouping_conflicts";
pub const REPROCESSING_RUNS: &str = "reprocessing_runs";
pub const REPROCESSED_EVENTS: &str = "reprocessed_events";
pub const JOBS_ENQUEUED: &str = "jobs_enqueued";
pub const JOB_RETRIES: &str = "job_retries";
