use std::sync::Arc;

use common_redis::{Client, CompressionConfig, RedisClient};
use tracing::info;

use crate::config::Config;
use crate::error::UnhandledError;
use crate::preprocessing::{PreprocessorProvider, PreprocessorRegistry};
use crate::processing_store::EventProcessingStore;
use crate::store::{EventStore, MemoryEventStore};

pub struct AppContext {
    pub config: Config,
    pub processing_store: EventProcessingStore,
    pub store: Arc<dyn EventStore + Send + Sync>,
    pub preprocessors: Arc<dyn PreprocessorProvider + Send + Sync>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, UnhandledError> {
        let compression = if config.compress_cache_payloads {
            CompressionConfig::default()
        } else {
            CompressionConfig::disabled()
        };
        let cache_client = RedisClient::with_config(config.redis_url.clone(), compression).await?;

        let context = Self::with_parts(
            config.clone(),
            Arc::new(cache_client),
            Arc::new(MemoryEventStore::new()),
            Arc::new(PreprocessorRegistry::new()),
        );

        info!("AppContext initialized");
        Ok(context)
    }

    /// Assembles a context from explicit parts. Tests inject the in-memory
    /// cache client and pre-populated registries through here.
    pub fn with_parts(
        config: Config,
        cache_client: Arc<dyn Client + Send + Sync>,
        store: Arc<dyn EventStore + Send + Sync>,
        preprocessors: Arc<dyn PreprocessorProvider + Send + Sync>,
    ) -> Self {
        let processing_store =
            EventProcessingStore::new(cache_client, config.raw_cache_ttl_seconds);
        Self {
            config,
            processing_store,
            store,
            preprocessors,
        }
    }
}
