//! Relayed frame type
//!
//! A frame is one complete viewer chunk, ready to be written verbatim into a
//! `multipart/x-mixed-replace; boundary=frame` response.

use std::ops::Range;

use bytes::Bytes;
use tokio::time::Instant;

use crate::mjpeg::Part;

/// One image update, shared by every subscriber it is delivered to
///
/// Cheap to clone: the chunk is reference counted and the JPEG payload is a
/// slice of the same allocation.
#[derive(Debug, Clone)]
pub struct Frame {
    chunk: Bytes,
    body: Range<usize>,
    captured_at: Instant,
    sequence: u64,
}

impl Frame {
    /// Build a frame from a demuxed part
    pub fn from_part(part: &Part, sequence: u64, captured_at: Instant) -> Self {
        let (chunk, body) = part.to_viewer_chunk();
        Self {
            chunk,
            body,
            captured_at,
            sequence,
        }
    }

    /// Bytes to write to a viewer (boundary, headers, payload, CRLF)
    pub fn chunk(&self) -> &Bytes {
        &self.chunk
    }

    /// The image payload alone
    pub fn jpeg(&self) -> Bytes {
        self.chunk.slice(self.body.clone())
    }

    /// When the relay received the frame
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Position of the frame in its relay's stream, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Size of the chunk in bytes
    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }
}
