//! Single-upstream MJPEG relay
//!
//! Pulls one `multipart/x-mixed-replace` stream per camera and fans its
//! frames out to any number of viewers. Each camera URL gets exactly one
//! upstream connection no matter how many viewers watch it. Frames are held
//! in a short rolling cache and released after a fixed serve delay, and each
//! viewer has its own bounded queue so a slow viewer only loses its own
//! frames.
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_relay::{RelayConfig, RelayDirectory, ViewerSession};
//!
//! # async fn run() -> mjpeg_relay::Result<()> {
//! let directory = RelayDirectory::new(RelayConfig::default());
//! let url = RelayDirectory::stream_url("192.168.1.20", 8080, "/stream0.mjpg");
//!
//! let relay = directory.get_or_create(&url)?;
//! let mut session = ViewerSession::open(relay)?;
//! while let Ok(chunk) = session.next_chunk().await {
//!     // write `chunk` to the viewer
//!     let _ = chunk;
//! }
//!
//! directory.stop_all();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod mjpeg;
pub mod relay;
pub mod stats;
pub mod viewer;

pub use client::{UpstreamConfig, UpstreamError};
pub use error::{Error, Result};
pub use mjpeg::{DemuxError, MultipartDemuxer, Part};
pub use relay::{
    Delivery, Frame, Relay, RelayConfig, RelayDirectory, RelayError, RelayState, RelayStats,
    SubscriberHandle,
};
pub use stats::{CacheStats, UpstreamStats};
pub use viewer::{ViewerConfig, ViewerError, ViewerSession};
