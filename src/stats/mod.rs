//! Relay statistics

pub mod metrics;

pub use metrics::{CacheStats, UpstreamCounters, UpstreamStats};
