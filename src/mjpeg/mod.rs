//! MJPEG stream handling
//!
//! This module provides:
//! - Incremental demuxing of `multipart/x-mixed-replace` camera streams
//! - JPEG marker scanning for cameras that send no multipart boundary
//! - Re-framing of parts under the fixed viewer boundary

pub mod demuxer;
pub mod part;

pub use demuxer::{DemuxError, MultipartDemuxer};
pub use part::{boundary_from_content_type, Part, VIEWER_BOUNDARY, VIEWER_CONTENT_TYPE};
