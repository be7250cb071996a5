//! Upstream error types
//!
//! Every variant is recoverable from the relay's point of view: the puller
//! logs it and reconnects after a backoff delay.

use crate::mjpeg::DemuxError;

/// Error type for the camera connection
#[derive(Debug)]
pub enum UpstreamError {
    /// Building the client, connecting, or reading the body failed
    Http(reqwest::Error),
    /// The camera answered with a non-success status
    Status(u16),
    /// The response is not a stream of images
    UnsupportedContentType(String),
    /// The multipart framing could not be parsed
    Demux(DemuxError),
    /// The camera closed the connection
    Closed,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Http(e) => write!(f, "HTTP error: {}", e),
            UpstreamError::Status(code) => write!(f, "Upstream returned status {}", code),
            UpstreamError::UnsupportedContentType(ct) => {
                write!(f, "Unsupported upstream content type: {}", ct)
            }
            UpstreamError::Demux(e) => write!(f, "Malformed stream: {}", e),
            UpstreamError::Closed => write!(f, "Upstream closed the connection"),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpstreamError::Http(e) => Some(e),
            UpstreamError::Demux(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Http(e)
    }
}

impl From<DemuxError> for UpstreamError {
    fn from(e: DemuxError) -> Self {
        UpstreamError::Demux(e)
    }
}
