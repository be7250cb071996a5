//! Upstream puller
//!
//! Owns the single connection to one camera URL. Parts read from the camera
//! are handed to a [`PartSink`]; connection failures are retried with capped
//! exponential backoff for as long as the sink reports it is running.

use std::sync::Arc;

use crate::mjpeg::Part;
use crate::stats::UpstreamCounters;

use super::backoff::Backoff;
use super::connector::{FrameStream, UpstreamConnector};
use super::error::UpstreamError;

/// Receiver of the parts pulled from a camera
pub trait PartSink: Send + Sync + 'static {
    /// Whether the puller should keep (re)connecting
    fn is_running(&self) -> bool;

    /// Take one part; returning `false` stops the puller
    fn accept(&self, part: Part) -> bool;
}

/// Connection loop for one camera URL
pub struct UpstreamPuller {
    url: String,
    connector: UpstreamConnector,
    counters: Arc<UpstreamCounters>,
}

impl UpstreamPuller {
    /// Create a puller for `url`
    pub fn new(
        url: impl Into<String>,
        connector: UpstreamConnector,
        counters: Arc<UpstreamCounters>,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            counters,
        }
    }

    /// Get the camera URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pull parts into `sink` until it stops running
    ///
    /// Never returns an error: every failure is logged and retried. Dropping
    /// the future (or aborting its task) closes the connection immediately.
    pub async fn run<S: PartSink>(self, sink: Arc<S>) {
        let mut backoff = Backoff::from_config(self.connector.config());

        while sink.is_running() {
            self.counters.record_attempt();
            tracing::info!(url = %self.url, "Connecting to upstream camera");

            let result = match self.connector.open(&self.url).await {
                Ok(stream) => {
                    self.counters.record_connected();
                    tracing::info!(url = %self.url, "Connected to upstream camera");
                    self.pump(stream, sink.as_ref(), &mut backoff).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    self.counters.record_error();
                    if !sink.is_running() {
                        break;
                    }

                    let delay = backoff.next_delay();
                    tracing::warn!(
                        url = %self.url,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Upstream unavailable, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::info!(url = %self.url, "Upstream puller stopped");
    }

    /// Feed parts to `sink`; the backoff is reset once the first part arrives
    async fn pump<S: PartSink>(
        &self,
        mut stream: FrameStream,
        sink: &S,
        backoff: &mut Backoff,
    ) -> Result<(), UpstreamError> {
        let mut first = true;
        loop {
            let part = stream.next_part().await?;
            self.counters.record_part(part.body.len());
            if first {
                backoff.reset();
                first = false;
            }

            if !sink.accept(part) {
                return Ok(());
            }
        }
    }
}
