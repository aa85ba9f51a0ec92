use std::time::Duration;

/// Worker process configuration loaded from environment variables.
///
/// All fields except the connection URLs have development defaults.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Public base of the object store, e.g. `https://s3.example.com/meshgen`.
    pub storage_base_url: String,
    /// Public base of the API deployment; proxied paths are resolved
    /// against it when handed to external providers.
    pub public_base_url: String,
    pub s3_bucket: String,
    pub image_api_base_url: String,
    pub image_api_key: String,
    pub image_provider_name: String,
    pub model_api_base_url: String,
    pub model_api_key: String,
    pub model_provider_name: String,
    /// Deadline for one image job attempt.
    pub image_job_timeout: Duration,
    pub model_poll_interval: Duration,
    pub model_poll_max_attempts: u32,
    pub timeout_sweep_interval: Duration,
    pub orphan_sweep_interval: Duration,
    pub orphan_max_retries: i32,
    pub orphan_batch: i64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Panics when `DATABASE_URL` or `REDIS_URL` is missing; everything
    /// else falls back to a development default.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL must be set"),
            storage_base_url: env_string("STORAGE_BASE_URL", "http://localhost:9000/meshgen"),
            public_base_url: env_string("PUBLIC_BASE_URL", "http://localhost:3000"),
            s3_bucket: env_string("S3_BUCKET", "meshgen"),
            image_api_base_url: env_string("IMAGE_API_BASE_URL", "https://api.openai.com"),
            image_api_key: env_string("IMAGE_API_KEY", ""),
            image_provider_name: env_string("IMAGE_PROVIDER_NAME", "openai"),
            model_api_base_url: env_string("MODEL_API_BASE_URL", "https://api.tripo3d.ai"),
            model_api_key: env_string("MODEL_API_KEY", ""),
            model_provider_name: env_string("MODEL_PROVIDER_NAME", "tripo"),
            image_job_timeout: Duration::from_secs(env_u64("IMAGE_JOB_TIMEOUT_SECS", 300)),
            model_poll_interval: Duration::from_secs(env_u64("MODEL_POLL_INTERVAL_SECS", 10)),
            model_poll_max_attempts: env_u64("MODEL_POLL_MAX_ATTEMPTS", 60) as u32,
            timeout_sweep_interval: Duration::from_secs(env_u64("TIMEOUT_SWEEP_INTERVAL_SECS", 60)),
            orphan_sweep_interval: Duration::from_secs(env_u64("ORPHAN_SWEEP_INTERVAL_SECS", 3600)),
            orphan_max_retries: env_u64("ORPHAN_MAX_RETRIES", 5) as i32,
            orphan_batch: env_u64("ORPHAN_SWEEP_BATCH", 50) as i64,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
