//! Logging, webhook pool and request log configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Webhook worker pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Number of delivery workers (0 = CPU count)
    #[serde(default)]
    pub workers: usize,
    /// Jobs waiting beyond this are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-request timeout for outbound calls
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
    /// Delivery records kept in memory
    #[serde(default = "default_webhook_history")]
    pub history: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_history() -> usize {
    500
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: default_queue_capacity(),
            timeout_ms: default_webhook_timeout_ms(),
            history: default_webhook_history(),
        }
    }
}

impl WebhookConfig {
    /// Worker count with `0` resolved to the CPU count.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestLogConfig {
    /// Entries kept for live inspection
    #[serde(default = "default_request_history")]
    pub history: usize,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_request_history() -> usize {
    1000
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            history: default_request_history(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}
