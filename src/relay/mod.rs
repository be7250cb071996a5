//! Per-camera relays and their directory
//!
//! A relay holds the one upstream connection for a camera URL and fans its
//! frames out to any number of viewers through bounded per-viewer queues.
//!
//! # Architecture
//!
//! ```text
//!                          RelayDirectory
//!                     ┌─────────────────────────┐
//!                     │ relays: HashMap<Url,    │
//!                     │   Arc<Relay> {          │
//!                     │     cache,              │
//!                     │     subscribers,        │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!   [Camera] ──► UpstreamPuller ──► Relay::ingest() ──► FrameCache
//!                                                          │
//!                                           pacer (after serve_delay)
//!                                                          │
//!                         ┌────────────────────────────────┼──────────┐
//!                         ▼                                ▼          ▼
//!                  SubscriberQueue                  SubscriberQueue  ...
//!                  recv_timeout()                   recv_timeout()
//!                         │                                │
//!                         └──► ViewerSession::next_chunk() ──► HTTP
//! ```
//!
//! # Zero-Copy Design
//!
//! A frame's chunk is a `bytes::Bytes`, so the cache, the last-frame slot and
//! every subscriber queue share one allocation per frame.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;
pub mod subscriber;

pub use cache::FrameCache;
pub use config::RelayConfig;
pub use entry::{Relay, RelayState, RelayStats};
pub use error::RelayError;
pub use frame::Frame;
pub use store::RelayDirectory;
pub use subscriber::{Delivery, RecvTimeout, SubscriberHandle, SubscriberId};
