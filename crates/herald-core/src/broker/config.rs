use serde::Deserialize;

/// Top-level broker configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
}

/// Server configuration (HTTP listen address, bearer token).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Token required in `Authorization: Bearer <token>`. `None` disables
    /// the check.
    pub api_token: Option<String>,
}

/// Scheduler configuration (channel capacity, poll interval, recovery paging).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub command_channel_capacity: usize,
    /// Upper bound on how long the dispatcher parks between ticks. It wakes
    /// earlier when the next deadline is sooner.
    pub poll_interval_ms: u64,
    /// Page size for the cursor scan run by recovery.
    pub recovery_batch_size: usize,
}

/// Callback delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub timeout_ms: u64,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            api_token: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 10_000,
            poll_interval_ms: 1_000,
            recovery_batch_size: 1_000,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            workers: 4,
        }
    }
}
