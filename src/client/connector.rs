//! Camera connection
//!
//! Opens the HTTP stream for a camera URL and turns its body into an
//! unbounded sequence of parts.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;

use crate::mjpeg::{boundary_from_content_type, MultipartDemuxer, Part};

use super::config::UpstreamConfig;
use super::error::UpstreamError;

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// HTTP connector for camera streams
///
/// Holds one `reqwest::Client`; each [`open`](Self::open) performs a fresh
/// `GET` and yields a new [`FrameStream`].
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamConnector {
    /// Create a connector with the given configuration
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the connector configuration
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Connect to `url` and start streaming
    pub async fn open(&self, url: &str) -> Result<FrameStream, UpstreamError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let demuxer = demuxer_for(&content_type)
            .ok_or(UpstreamError::UnsupportedContentType(content_type.clone()))?
            .max_part_size(self.config.max_part_size);

        tracing::debug!(
            url = %url,
            content_type = %content_type,
            "Upstream response accepted"
        );

        Ok(FrameStream::new(response.bytes_stream(), demuxer))
    }
}

/// Pick the demuxer matching a response `Content-Type`
///
/// Multipart responses with a boundary are split on it. Image and untyped
/// responses without one fall back to JPEG marker scanning.
pub fn demuxer_for(content_type: &str) -> Option<MultipartDemuxer> {
    if let Some(boundary) = boundary_from_content_type(content_type) {
        return Some(MultipartDemuxer::new(&boundary));
    }

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "" | "application/octet-stream" => Some(MultipartDemuxer::jpeg_markers()),
        m if m.starts_with("multipart/") || m.starts_with("image/") => {
            Some(MultipartDemuxer::jpeg_markers())
        }
        _ => None,
    }
}

/// Lazy, unbounded sequence of parts read from one camera connection
///
/// The sequence never ends normally: a closed connection, malformed framing
/// or a read error are all reported as errors, and the stream cannot be
/// restarted. The connection closes when the stream is dropped.
pub struct FrameStream {
    body: BodyStream,
    demuxer: MultipartDemuxer,
    bytes_read: u64,
}

impl FrameStream {
    /// Wrap a body stream and the demuxer that splits it
    pub fn new<S>(body: S, demuxer: MultipartDemuxer) -> Self
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
            demuxer,
            bytes_read: 0,
        }
    }

    /// Total bytes read from the connection
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Wait for the next complete part
    pub async fn next_part(&mut self) -> Result<Part, UpstreamError> {
        loop {
            if let Some(part) = self.demuxer.next_part()? {
                return Ok(part);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.bytes_read += chunk.len() as u64;
                    self.demuxer.push(&chunk);
                }
                Some(Err(e)) => return Err(UpstreamError::Http(e)),
                None => return Err(UpstreamError::Closed),
            }
        }
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("demuxer", &self.demuxer)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}
