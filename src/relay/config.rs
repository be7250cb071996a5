//! Relay configuration

use std::time::Duration;

use crate::client::UpstreamConfig;

/// Tuning for every relay in a directory
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Trailing window of frames kept in the cache
    pub cache_duration: Duration,

    /// Delay between capture and delivery to subscribers
    pub serve_delay: Duration,

    /// How long a new viewer waits for the first frame
    pub warmup_timeout: Duration,

    /// Idle waits a viewer tolerates before it is dropped
    pub max_consecutive_timeouts: u32,

    /// Length of one idle wait
    pub queue_timeout: Duration,

    /// Frames buffered per subscriber before the oldest is dropped
    pub queue_capacity: usize,

    /// Camera connection options
    pub upstream: UpstreamConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(15),
            serve_delay: Duration::from_secs(2),
            warmup_timeout: Duration::from_secs(15),
            max_consecutive_timeouts: 10,
            queue_timeout: Duration::from_secs(15),
            queue_capacity: 50,
            upstream: UpstreamConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Set the cache window
    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// Set the serve delay
    pub fn serve_delay(mut self, delay: Duration) -> Self {
        self.serve_delay = delay;
        self
    }

    /// Set the warmup timeout
    pub fn warmup_timeout(mut self, timeout: Duration) -> Self {
        self.warmup_timeout = timeout;
        self
    }

    /// Set the idle wait tolerance
    pub fn max_consecutive_timeouts(mut self, count: u32) -> Self {
        self.max_consecutive_timeouts = count;
        self
    }

    /// Set the idle wait length
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Set the per-subscriber queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the camera connection options
    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }
}
