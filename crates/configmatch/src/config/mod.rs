pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{RequeuePolicy, RetryPolicy};
use crate::store::memory::DEFAULT_WATCH_CAPACITY;

pub use loader::{load_config, load_config_from_str};

/// Runtime settings for the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub worker_count: usize,
    pub retry: RetryConfig,
    pub requeue: RequeueConfig,
    pub watch_channel_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            retry: RetryConfig::default(),
            requeue: RequeueConfig::default(),
            watch_channel_capacity: DEFAULT_WATCH_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }

    pub fn requeue_policy(&self) -> RequeuePolicy {
        RequeuePolicy {
            base_delay: Duration::from_millis(self.requeue.base_delay_ms),
            max_delay: Duration::from_millis(self.requeue.max_delay_ms),
        }
    }
}

/// Bounds the conflict retry loop inside one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
        }
    }
}

/// Backoff for requests whose reconciliation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequeueConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
