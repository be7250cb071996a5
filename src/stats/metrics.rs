//! Statistics for relays and their upstream connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters for one upstream connection loop
///
/// Updated by the puller task, read from anywhere.
#[derive(Debug, Default)]
pub struct UpstreamCounters {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    upstream_errors: AtomicU64,
    parts_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl UpstreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_part(&self, bytes: usize) {
        self.parts_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of the counters
    pub fn snapshot(&self) -> UpstreamStats {
        UpstreamStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            parts_received: self.parts_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Upstream connection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamStats {
    /// Connection attempts, successful or not
    pub connect_attempts: u64,
    /// Connections that got a streaming response
    pub connections: u64,
    /// Failed attempts and broken streams
    pub upstream_errors: u64,
    /// Parts read from the camera
    pub parts_received: u64,
    /// Payload bytes read from the camera
    pub bytes_received: u64,
}

impl UpstreamStats {
    /// Fraction of attempts that ended in an error
    pub fn error_rate(&self) -> f64 {
        if self.connect_attempts > 0 {
            self.upstream_errors as f64 / self.connect_attempts as f64
        } else {
            0.0
        }
    }
}

/// Frame cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Frames currently in the window
    pub frames_in_cache: usize,
    /// Frames ever stored
    pub frames_received: u64,
    /// Frames released to subscribers
    pub frames_served: u64,
    /// Age of the oldest cached frame
    pub oldest_frame_age: Duration,
    /// Age of the newest cached frame
    pub newest_frame_age: Duration,
}
