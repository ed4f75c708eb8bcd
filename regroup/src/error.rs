use common_redis::CustomRedisError;
use common_types::StoredEvent;
use thiserror::Error;
use uuid::Uuid;

/// The per-event outcome of a pipeline run. An `Err` means the event was
/// dropped; anything recoverable ends up annotated on the stored payload
/// instead.
pub type PipelineResult = Result<StoredEvent, EventError>;

/// Errors scoped to a single event. These never fail the job that carried
/// the event; they are reported and the event is dropped.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    #[error("no raw payload in the processing cache under {0}")]
    CacheMiss(String),
    #[error("failed to deserialize cached payload under {0}: {1}")]
    FailedToDeserialize(String, String),
    #[error("no original payload retained for event {0}")]
    MissingOriginalPayload(Uuid),
}

/// Errors that mean the job itself failed: a dependency is down or we have a
/// logic error. Surfaced to the scheduler, which retries the job - safe
/// because store writes are idempotent by event id.
#[derive(Debug, Error)]
pub enum UnhandledError {
    #[error("Config error: {0}")]
    Config(#[from] envconfig::Error),
    #[error("Cache error: {0}")]
    Cache(CustomRedisError),
    #[error("Store write failed: {0}")]
    StoreWrite(String),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<CustomRedisError> for UnhandledError {
    fn from(err: CustomRedisError) -> Self {
        UnhandledError::Cache(err)
    }
}
