//! Per-queue tuning knobs.

use std::time::Duration;

/// Configuration for one named queue and its runner.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name, used as the key hash tag.
    pub name: String,
    /// Maximum handlers running at once in this process.
    pub concurrency: usize,
    /// Maximum dequeues per rate window. `None` disables the limiter.
    pub rate_limit_max: Option<u32>,
    /// Width of the fixed rate window.
    pub rate_limit_window: Duration,
    /// Total delivery attempts before a job is parked in the failed list.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,
    /// How many entries the completed history keeps. `isize` because the
    /// caps feed straight into LTRIM bounds.
    pub completed_cap: isize,
    /// How many entries the failed history keeps.
    pub failed_cap: isize,
    /// Idle sleep between polls when the ready list is empty.
    pub poll_interval: Duration,
}

impl QueueConfig {
    /// Defaults for the image generation queue: wide concurrency, modest
    /// rate cap against the upstream image API.
    pub fn image_generation() -> Self {
        Self {
            name: "image-generation".to_string(),
            concurrency: env_usize("IMAGE_QUEUE_CONCURRENCY", 5),
            rate_limit_max: Some(env_u32("IMAGE_QUEUE_RATE_MAX", 10)),
            rate_limit_window: Duration::from_secs(env_u64("IMAGE_QUEUE_RATE_WINDOW_SECS", 1)),
            max_attempts: env_u32("IMAGE_QUEUE_MAX_ATTEMPTS", 3),
            backoff_base: Duration::from_secs(env_u64("IMAGE_QUEUE_BACKOFF_SECS", 5)),
            completed_cap: 1000,
            failed_cap: 5000,
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Defaults for the model generation queue: narrow concurrency because
    /// each job holds a long-lived polling loop against the 3D provider.
    pub fn model_generation() -> Self {
        Self {
            name: "model-generation".to_string(),
            concurrency: env_usize("MODEL_QUEUE_CONCURRENCY", 2),
            rate_limit_max: Some(env_u32("MODEL_QUEUE_RATE_MAX", 5)),
            rate_limit_window: Duration::from_secs(env_u64("MODEL_QUEUE_RATE_WINDOW_SECS", 1)),
            max_attempts: env_u32("MODEL_QUEUE_MAX_ATTEMPTS", 3),
            backoff_base: Duration::from_secs(env_u64("MODEL_QUEUE_BACKOFF_SECS", 10)),
            completed_cap: 1000,
            failed_cap: 5000,
            poll_interval: Duration::from_millis(500),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_trims_to_positive_bounds() {
        for config in [QueueConfig::image_generation(), QueueConfig::model_generation()] {
            // LTRIM keeps indices 0..=cap-1; a non-positive cap would
            // empty the history list instead of capping it.
            let completed_stop: isize = config.completed_cap - 1;
            let failed_stop: isize = config.failed_cap - 1;
            assert!(completed_stop >= 0);
            assert!(failed_stop >= 0);
            assert!(config.failed_cap > config.completed_cap);
        }
    }
}
