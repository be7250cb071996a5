//! Upstream connection configuration

use std::time::Duration;

use crate::mjpeg::demuxer::DEFAULT_MAX_PART_SIZE;

/// Options for the connection to a camera
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Time allowed to establish the TCP connection
    pub connect_timeout: Duration,

    /// Maximum silence on an open connection before it is considered dead
    pub read_timeout: Duration,

    /// User-Agent sent to the camera
    pub user_agent: String,

    /// First reconnect delay
    pub backoff_initial: Duration,

    /// Reconnect delay ceiling
    pub backoff_max: Duration,

    /// Growth factor applied to the delay after each failed attempt
    pub backoff_multiplier: f64,

    /// Largest part (or garbage run) accepted before the stream is
    /// considered malformed
    pub max_part_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            user_agent: concat!("mjpeg-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_part_size: DEFAULT_MAX_PART_SIZE,
        }
    }
}

impl UpstreamConfig {
    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the reconnect backoff bounds
    ///
    /// `max` is raised to `initial` if it is smaller.
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max.max(initial);
        self
    }

    /// Set the backoff growth factor (values below 1.0, and NaN, are treated
    /// as 1.0)
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_nan() {
            1.0
        } else {
            multiplier.max(1.0)
        };
        self
    }

    /// Set the maximum part size
    pub fn max_part_size(mut self, size: usize) -> Self {
        self.max_part_size = size;
        self
    }
}
