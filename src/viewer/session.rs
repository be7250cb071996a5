//! Viewer session
//!
//! Drains one subscriber queue on behalf of an HTTP response. The session
//! decides when a viewer is given up on: no first frame within the warmup
//! window, too many idle waits in a row, or relay shutdown.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::relay::{Delivery, Relay, RelayConfig, RelayError, SubscriberHandle};

/// Timeouts applied to one viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerConfig {
    /// Wait for the first frame
    pub warmup_timeout: Duration,
    /// Wait for each later frame
    pub queue_timeout: Duration,
    /// Idle waits tolerated in a row
    pub max_consecutive_timeouts: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for ViewerConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            warmup_timeout: config.warmup_timeout,
            queue_timeout: config.queue_timeout,
            max_consecutive_timeouts: config.max_consecutive_timeouts,
        }
    }
}

/// Why a viewer session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerError {
    /// No frame arrived within the warmup window
    WarmupTimeout(Duration),
    /// Too many idle waits in a row
    Idle(u32),
    /// The relay stopped
    Shutdown,
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewerError::WarmupTimeout(waited) => {
                write!(f, "No frame within {:.1}s of joining", waited.as_secs_f64())
            }
            ViewerError::Idle(timeouts) => {
                write!(f, "No frame after {} consecutive timeouts", timeouts)
            }
            ViewerError::Shutdown => write!(f, "Relay shut down"),
        }
    }
}

impl std::error::Error for ViewerError {}

/// One viewer attached to a relay
///
/// Dropping the session unsubscribes it.
pub struct ViewerSession {
    relay: Arc<Relay>,
    handle: SubscriberHandle,
    config: ViewerConfig,
    frames_sent: u64,
}

impl ViewerSession {
    /// Subscribe to `relay` using its configured timeouts
    pub fn open(relay: Arc<Relay>) -> Result<Self, RelayError> {
        let config = ViewerConfig::from(relay.config());
        Self::with_config(relay, config)
    }

    /// Subscribe to `relay` with explicit timeouts
    pub fn with_config(relay: Arc<Relay>, config: ViewerConfig) -> Result<Self, RelayError> {
        let handle = relay.subscribe()?;
        Ok(Self {
            relay,
            handle,
            config,
            frames_sent: 0,
        })
    }

    /// The relay this session reads from
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// The underlying subscriber handle
    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    /// Chunks returned so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Wait for the next chunk to write to the viewer
    pub async fn next_chunk(&mut self) -> Result<Bytes, ViewerError> {
        if self.frames_sent == 0 {
            return match self.handle.recv_timeout(self.config.warmup_timeout).await {
                Ok(Delivery::Frame(frame)) => Ok(self.sent(frame.chunk().clone())),
                Ok(Delivery::Shutdown) => Err(ViewerError::Shutdown),
                Err(_) => {
                    tracing::debug!(
                        url = %self.relay.url(),
                        subscriber = %self.handle.id(),
                        "No frame during warmup"
                    );
                    Err(ViewerError::WarmupTimeout(self.config.warmup_timeout))
                }
            };
        }

        let mut timeouts = 0;
        loop {
            match self.handle.recv_timeout(self.config.queue_timeout).await {
                Ok(Delivery::Frame(frame)) => return Ok(self.sent(frame.chunk().clone())),
                Ok(Delivery::Shutdown) => return Err(ViewerError::Shutdown),
                Err(_) => {
                    timeouts += 1;
                    if !self.relay.is_running() {
                        return Err(ViewerError::Shutdown);
                    }
                    if timeouts >= self.config.max_consecutive_timeouts {
                        tracing::debug!(
                            url = %self.relay.url(),
                            subscriber = %self.handle.id(),
                            timeouts = timeouts,
                            "Viewer idle"
                        );
                        return Err(ViewerError::Idle(timeouts));
                    }
                }
            }
        }
    }

    fn sent(&mut self, chunk: Bytes) -> Bytes {
        self.frames_sent += 1;
        chunk
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.relay.unsubscribe(&self.handle);
    }
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("url", &self.relay.url())
            .field("subscriber", &self.handle.id())
            .field("frames_sent", &self.frames_sent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::client::testing::jpeg;
    use crate::mjpeg::Part;

    fn relay(config: RelayConfig) -> Arc<Relay> {
        let relay = Arc::new(Relay::new("http://camera.test/stream0.mjpg", config).unwrap());
        relay.start_without_upstream();
        relay
    }

    fn part(n: u32) -> Part {
        Part::jpeg(Bytes::from(jpeg(n)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_timeout_bounds() {
        let relay = relay(
            RelayConfig::default()
                .warmup_timeout(Duration::from_secs(15))
                .serve_delay(Duration::ZERO),
        );
        let mut session = ViewerSession::open(Arc::clone(&relay)).unwrap();

        let start = Instant::now();
        let result = session.next_chunk().await;

        assert_eq!(
            result.unwrap_err(),
            ViewerError::WarmupTimeout(Duration::from_secs(15))
        );
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_frame_during_warmup() {
        let relay = relay(RelayConfig::default().serve_delay(Duration::from_secs(2)));
        let mut session = ViewerSession::open(Arc::clone(&relay)).unwrap();

        let feeder = Arc::clone(&relay);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            feeder.ingest(part(1));
        });

        let start = Instant::now();
        let chunk = session.next_chunk().await.unwrap();

        assert!(chunk.starts_with(b"--frame\r\n"));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(session.frames_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_consecutive_timeouts() {
        let relay = relay(
            RelayConfig::default()
                .serve_delay(Duration::ZERO)
                .queue_timeout(Duration::from_secs(1))
                .max_consecutive_timeouts(3),
        );
        let mut session = ViewerSession::open(Arc::clone(&relay)).unwrap();

        relay.ingest(part(1));
        session.next_chunk().await.unwrap();

        let start = Instant::now();
        assert_eq!(session.next_chunk().await.unwrap_err(), ViewerError::Idle(3));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_session() {
        let relay = relay(RelayConfig::default().serve_delay(Duration::ZERO));
        let mut session = ViewerSession::open(Arc::clone(&relay)).unwrap();

        relay.ingest(part(1));
        session.next_chunk().await.unwrap();

        let stopper = Arc::clone(&relay);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.stop();
        });

        assert_eq!(session.next_chunk().await.unwrap_err(), ViewerError::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unsubscribes() {
        let relay = relay(RelayConfig::default());

        let session = ViewerSession::open(Arc::clone(&relay)).unwrap();
        assert_eq!(relay.subscriber_count(), 1);

        drop(session);
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_after_stop() {
        let relay = relay(RelayConfig::default());
        relay.stop();

        assert!(matches!(
            ViewerSession::open(relay),
            Err(RelayError::Unavailable(_))
        ));
    }

    #[test]
    fn test_config_from_relay_config() {
        let config = ViewerConfig::from(
            &RelayConfig::default()
                .warmup_timeout(Duration::from_secs(4))
                .max_consecutive_timeouts(2),
        );

        assert_eq!(config.warmup_timeout, Duration::from_secs(4));
        assert_eq!(config.queue_timeout, Duration::from_secs(15));
        assert_eq!(config.max_consecutive_timeouts, 2);
        assert_eq!(ViewerConfig::default().max_consecutive_timeouts, 10);
    }
}
