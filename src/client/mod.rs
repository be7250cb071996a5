//! Camera client
//!
//! Provides the upstream side of the relay:
//! - Opening the HTTP MJPEG stream of a camera
//! - Pulling parts with automatic reconnect and capped exponential backoff

pub mod backoff;
pub mod config;
pub mod connector;
pub mod error;
pub mod puller;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use config::UpstreamConfig;
pub use connector::{FrameStream, UpstreamConnector};
pub use error::UpstreamError;
pub use puller::{PartSink, UpstreamPuller};
