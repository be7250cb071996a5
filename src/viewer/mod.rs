//! Viewer side of the relay
//!
//! This module provides:
//! - A session that drains one subscriber queue with warmup and idle limits
//! - The headers every viewer response carries

pub mod response;
pub mod session;

pub use response::{content_type, response_headers, NO_CACHE_HEADERS};
pub use session::{ViewerConfig, ViewerError, ViewerSession};
