use std::time::Duration;

use groupstream_types::{StartPosition, defaults};
use serde::{Deserialize, Serialize};

/// Transport-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Group provisioned eagerly when a producer appends to a new log
    pub default_group: String,

    /// Approximate length bound applied when `append` gets no explicit one
    pub max_length: usize,

    /// Entries requested per group read when the caller gives no count
    pub read_count: usize,

    /// Where newly provisioned groups start reading
    pub start_position: StartPosition,

    /// Acknowledge every delivery as soon as it is read
    pub auto_ack: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_group: "default".to_string(),
            max_length: defaults::MAX_LENGTH,
            read_count: defaults::READ_COUNT,
            start_position: StartPosition::Beginning,
            auto_ack: false,
        }
    }
}

impl TransportConfig {
    /// Set the group provisioned on append
    pub fn with_default_group(mut self, group: impl Into<String>) -> Self {
        self.default_group = group.into();
        self
    }

    /// Set the default approximate length bound
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the default read batch size
    pub fn with_read_count(mut self, read_count: usize) -> Self {
        self.read_count = read_count;
        self
    }

    /// Enable acknowledge-on-read
    pub fn with_auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }
}

/// Settings for one polling consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Log to read from
    pub log_key: String,

    /// Consumer group the consumer belongs to
    pub group: String,

    /// Consumer identity within the group
    pub consumer: String,

    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,

    /// Entries requested per poll (transport default when unset)
    pub batch_size: Option<usize>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            log_key: "events".to_string(),
            group: "default".to_string(),
            consumer: "consumer-1".to_string(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            batch_size: None,
        }
    }
}

impl ConsumerConfig {
    /// Create a consumer configuration
    pub fn new(
        log_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            log_key: log_key.into(),
            group: group.into(),
            consumer: consumer.into(),
            ..Default::default()
        }
    }

    /// Set the polling cadence
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the per-poll batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
