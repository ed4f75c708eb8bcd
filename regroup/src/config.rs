use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,

    // Raw payloads only need to survive the gap between enqueue and
    // processing, plus the reprocessing window.
    #[envconfig(default = "3600")]
    pub raw_cache_ttl_seconds: u64,

    #[envconfig(default = "false")]
    pub compress_cache_payloads: bool,

    #[envconfig(default = "4")]
    pub worker_count: usize,

    #[envconfig(default = "1")]
    pub job_poll_interval_seconds: u64,

    #[envconfig(default = "16")]
    pub max_concurrent_reprocessing: usize,

    // Store writes are idempotent by event id, so retrying a failed job is
    // always safe.
    #[envconfig(default = "3")]
    pub job_attempts: u32,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }
}
