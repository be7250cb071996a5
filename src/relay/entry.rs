//! Per-camera relay
//!
//! A relay owns the single upstream connection for one camera URL, the frame
//! cache, and the registry of subscriber queues. Two tasks run while it is
//! live: the upstream puller, which stamps and caches every part, and the
//! pacer, which releases cached frames once `serve_delay` has passed and
//! broadcasts them.
//!
//! The registry, the last-frame reference and the lifecycle state live behind
//! one lock. The cache has its own; when both are taken the state lock comes
//! first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::{PartSink, UpstreamConnector, UpstreamPuller};
use crate::mjpeg::Part;
use crate::stats::{CacheStats, UpstreamCounters, UpstreamStats};

use super::cache::FrameCache;
use super::config::RelayConfig;
use super::error::RelayError;
use super::frame::Frame;
use super::subscriber::{SubscriberHandle, SubscriberId, SubscriberQueue};

/// Lifecycle state of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Constructed, no tasks running
    Created,
    /// Tasks being spawned
    Starting,
    /// Puller active, frames flowing
    Running,
    /// Tearing down
    Stopping,
    /// Terminal
    Stopped,
}

struct RelayInner {
    state: RelayState,
    last_frame: Option<Frame>,
    subscribers: HashMap<SubscriberId, Arc<SubscriberQueue>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Relay for one camera URL
pub struct Relay {
    url: String,
    config: RelayConfig,
    connector: UpstreamConnector,
    inner: Mutex<RelayInner>,
    cache: FrameCache,
    frame_ready: Notify,
    counters: Arc<UpstreamCounters>,
    next_sequence: AtomicU64,
    next_subscriber_id: AtomicU64,
    puller_starts: AtomicU64,
}

impl Relay {
    /// Create a relay for `url` (not started)
    pub fn new(url: impl Into<String>, config: RelayConfig) -> Result<Self, RelayError> {
        let connector = UpstreamConnector::new(config.upstream.clone())?;

        Ok(Self {
            url: url.into(),
            cache: FrameCache::new(config.cache_duration),
            config,
            connector,
            inner: Mutex::new(RelayInner {
                state: RelayState::Created,
                last_frame: None,
                subscribers: HashMap::new(),
                tasks: Vec::new(),
            }),
            frame_ready: Notify::new(),
            counters: Arc::new(UpstreamCounters::new()),
            next_sequence: AtomicU64::new(0),
            next_subscriber_id: AtomicU64::new(1),
            puller_starts: AtomicU64::new(0),
        })
    }

    /// Get the camera URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start pulling from the camera
    ///
    /// Spawns the puller and pacer tasks; must be called within a tokio
    /// runtime. Does nothing unless the relay is in `Created`.
    pub fn start(self: &Arc<Self>) {
        self.start_tasks(true);
    }

    fn start_tasks(self: &Arc<Self>, with_upstream: bool) {
        let mut inner = self.inner.lock();
        if inner.state != RelayState::Created {
            return;
        }
        inner.state = RelayState::Starting;

        if with_upstream {
            let puller = UpstreamPuller::new(
                self.url.clone(),
                self.connector.clone(),
                Arc::clone(&self.counters),
            );
            inner.tasks.push(tokio::spawn(puller.run(Arc::clone(self))));
            self.puller_starts.fetch_add(1, Ordering::Relaxed);
        }
        inner.tasks.push(tokio::spawn(Arc::clone(self).pace()));

        inner.state = RelayState::Running;
        drop(inner);

        tracing::info!(
            url = %self.url,
            serve_delay_ms = self.config.serve_delay.as_millis() as u64,
            cache_secs = self.config.cache_duration.as_secs_f64(),
            "Relay started"
        );
    }

    /// Start only the pacer; frames are fed through [`ingest`](Self::ingest)
    #[cfg(test)]
    pub(crate) fn start_without_upstream(self: &Arc<Self>) {
        self.start_tasks(false);
    }

    /// Stop the relay
    ///
    /// Aborts the puller (closing the camera connection) and the pacer,
    /// places the shutdown sentinel in every subscriber queue and clears the
    /// registry. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, RelayState::Stopping | RelayState::Stopped) {
            return;
        }
        inner.state = RelayState::Stopping;

        for task in inner.tasks.drain(..) {
            task.abort();
        }

        let subscribers = inner.subscribers.len();
        for (_, queue) in inner.subscribers.drain() {
            queue.shutdown();
        }

        inner.last_frame = None;
        self.cache.clear();
        inner.state = RelayState::Stopped;
        drop(inner);

        tracing::info!(url = %self.url, subscribers = subscribers, "Relay stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        self.inner.lock().state
    }

    /// Whether frames are flowing (or the puller is trying to get them)
    pub fn is_running(&self) -> bool {
        self.state() == RelayState::Running
    }

    /// Register a new subscriber
    ///
    /// Never waits. The most recent served frame, if any, is queued right
    /// away so the viewer has something to show immediately.
    pub fn subscribe(&self) -> Result<SubscriberHandle, RelayError> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, RelayState::Stopping | RelayState::Stopped) {
            return Err(RelayError::Unavailable(self.url.clone()));
        }

        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(SubscriberQueue::new(self.config.queue_capacity));
        if let Some(frame) = &inner.last_frame {
            queue.push(frame.clone());
        }
        inner.subscribers.insert(id, Arc::clone(&queue));
        let count = inner.subscribers.len();
        drop(inner);

        tracing::info!(
            url = %self.url,
            subscriber = %id,
            subscribers = count,
            "Subscriber added"
        );

        Ok(SubscriberHandle::new(id, queue))
    }

    /// Remove a subscriber; unknown or already removed handles are ignored
    pub fn unsubscribe(&self, handle: &SubscriberHandle) {
        let mut inner = self.inner.lock();
        let removed = inner.subscribers.remove(&handle.id()).is_some();
        let count = inner.subscribers.len();
        drop(inner);

        if removed {
            tracing::debug!(
                url = %self.url,
                subscriber = %handle.id(),
                subscribers = count,
                "Subscriber removed"
            );
        }
    }

    /// Stamp and cache a part received from the camera
    ///
    /// Returns `false` (and drops the part) unless the relay is running.
    pub fn ingest(&self, part: Part) -> bool {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Frame::from_part(&part, sequence, Instant::now());

        let inner = self.inner.lock();
        if inner.state != RelayState::Running {
            return false;
        }
        self.cache.push(frame);
        drop(inner);

        self.frame_ready.notify_one();
        true
    }

    /// Most recent frame released to subscribers
    pub fn last_frame(&self) -> Option<Frame> {
        self.inner.lock().last_frame.clone()
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Cached frames, oldest first
    pub fn cached_frames(&self) -> Vec<Frame> {
        self.cache.frames()
    }

    /// Diagnostic snapshot
    pub fn stats(&self) -> RelayStats {
        let inner = self.inner.lock();
        RelayStats {
            url: self.url.clone(),
            state: inner.state,
            running: inner.state == RelayState::Running,
            subscriber_count: inner.subscribers.len(),
            has_frame: inner.last_frame.is_some(),
            puller_starts: self.puller_starts.load(Ordering::Relaxed),
            cache: self.cache.stats(Instant::now()),
            upstream: self.counters.snapshot(),
        }
    }

    /// Release cached frames as they come due, until the relay stops
    async fn pace(self: Arc<Self>) {
        loop {
            let (due, next_due) = self
                .cache
                .take_due(Instant::now(), self.config.serve_delay);

            for frame in due {
                if !self.broadcast(frame) {
                    return;
                }
            }

            match next_due {
                Some(at) => tokio::time::sleep_until(at).await,
                None => self.frame_ready.notified().await,
            }
        }
    }

    /// Push a frame into every subscriber queue without waiting
    fn broadcast(&self, frame: Frame) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != RelayState::Running {
            return false;
        }

        for (id, queue) in &inner.subscribers {
            if queue.push(frame.clone()) {
                tracing::debug!(
                    url = %self.url,
                    subscriber = %id,
                    "Subscriber queue full, dropped oldest frame"
                );
            }
        }
        inner.last_frame = Some(frame);
        true
    }
}

impl PartSink for Relay {
    fn is_running(&self) -> bool {
        Relay::is_running(self)
    }

    fn accept(&self, part: Part) -> bool {
        self.ingest(part)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Statistics for a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Camera URL
    pub url: String,
    /// Lifecycle state
    pub state: RelayState,
    /// Whether the relay is running
    pub running: bool,
    /// Number of registered subscribers
    pub subscriber_count: usize,
    /// Whether a frame has been served
    pub has_frame: bool,
    /// Puller tasks ever spawned (never more than one)
    pub puller_starts: u64,
    /// Frame cache statistics
    pub cache: CacheStats,
    /// Upstream connection statistics
    pub upstream: UpstreamStats,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::client::testing::{jpeg, multipart_part, FakeCamera};
    use crate::relay::subscriber::Delivery;

    fn part(n: u32) -> Part {
        Part::jpeg(Bytes::from(jpeg(n)))
    }

    fn relay(config: RelayConfig) -> Arc<Relay> {
        Arc::new(Relay::new("http://camera.test/stream0.mjpg", config).unwrap())
    }

    fn immediate() -> RelayConfig {
        RelayConfig::default().serve_delay(Duration::ZERO)
    }

    async fn next_frame(handle: &SubscriberHandle) -> Frame {
        match handle.recv_timeout(Duration::from_secs(5)).await {
            Ok(Delivery::Frame(frame)) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_in_order() {
        let relay = relay(immediate());
        relay.start_without_upstream();

        let subscribers: Vec<_> = (0..3).map(|_| relay.subscribe().unwrap()).collect();
        for n in 0..20 {
            assert!(relay.ingest(part(n)));
        }

        for handle in &subscribers {
            let mut received = Vec::new();
            for _ in 0..20 {
                received.push(next_frame(handle).await);
            }
            let payloads: Vec<Bytes> = received.iter().map(Frame::jpeg).collect();
            let expected: Vec<Bytes> = (0..20).map(|n| Bytes::from(jpeg(n))).collect();
            assert_eq!(payloads, expected);
            assert!(received
                .windows(2)
                .all(|w| w[0].sequence() < w[1].sequence()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_keeps_most_recent() {
        let relay = relay(immediate().queue_capacity(5));
        relay.start_without_upstream();

        let slow = relay.subscribe().unwrap();
        let fast = relay.subscribe().unwrap();

        for n in 0..12 {
            relay.ingest(part(n));
            // The fast subscriber drains every frame as it arrives.
            assert_eq!(next_frame(&fast).await.jpeg(), Bytes::from(jpeg(n)));
        }

        assert_eq!(slow.len(), 5);
        assert_eq!(slow.dropped(), 7);
        let mut kept = Vec::new();
        while let Some(Delivery::Frame(frame)) = slow.try_recv() {
            kept.push(frame.sequence());
        }
        assert_eq!(kept, vec![8, 9, 10, 11, 12]);
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_gets_last_frame() {
        let relay = relay(immediate());
        relay.start_without_upstream();

        let early = relay.subscribe().unwrap();
        relay.ingest(part(1));
        relay.ingest(part(2));
        next_frame(&early).await;
        next_frame(&early).await;

        let late = relay.subscribe().unwrap();
        match late.try_recv() {
            Some(Delivery::Frame(frame)) => assert_eq!(frame.sequence(), 2),
            other => panic!("expected last frame, got {:?}", other),
        }
        assert!(relay.stats().has_frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_delay_holds_frames() {
        let relay = relay(RelayConfig::default().serve_delay(Duration::from_secs(2)));
        relay.start_without_upstream();
        let handle = relay.subscribe().unwrap();

        let start = Instant::now();
        relay.ingest(part(1));

        assert!(handle
            .recv_timeout(Duration::from_millis(1900))
            .await
            .is_err());
        assert!(relay.last_frame().is_none());

        let frame = next_frame(&handle).await;
        assert_eq!(frame.sequence(), 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(frame.captured_at(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_joiner_served_promptly() {
        let interval = Duration::from_millis(100);
        let serve_delay = Duration::from_secs(2);
        let relay = relay(
            RelayConfig::default()
                .cache_duration(Duration::from_secs(15))
                .serve_delay(serve_delay),
        );
        relay.start_without_upstream();

        let feeder = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let mut n = 0;
                loop {
                    relay.ingest(part(n));
                    n += 1;
                    tokio::time::sleep(interval).await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(3050)).await;

        let joined = Instant::now();
        let handle = relay.subscribe().unwrap();
        assert!(matches!(handle.try_recv(), Some(Delivery::Frame(_))));

        let frame = handle
            .recv_timeout(serve_delay + interval)
            .await
            .map(|d| matches!(d, Delivery::Frame(_)));
        assert_eq!(frame, Ok(true));
        assert!(joined.elapsed() <= interval);

        let stats = relay.stats();
        assert!(stats.cache.frames_in_cache >= 30);
        assert!(stats.cache.oldest_frame_age <= Duration::from_secs(15) + interval);

        feeder.abort();
        relay.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_delay_longer_than_cache_window() {
        let interval = Duration::from_millis(100);
        let relay = relay(
            RelayConfig::default()
                .cache_duration(Duration::from_millis(500))
                .serve_delay(Duration::from_secs(2)),
        );
        relay.start_without_upstream();
        let handle = relay.subscribe().unwrap();

        let feeder = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                for n in 0..100 {
                    relay.ingest(part(n));
                    tokio::time::sleep(interval).await;
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 50 {
            received.push(next_frame(&handle).await.sequence());
        }
        assert_eq!(received, (1..=50).collect::<Vec<u64>>());

        let stats = relay.stats();
        assert!(stats.cache.frames_served >= 50);
        // Released frames still age out of the short window.
        assert!(stats.cache.frames_in_cache < 40);

        feeder.abort();
        relay.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sends_sentinel_to_all() {
        let relay = relay(immediate());
        relay.start_without_upstream();
        relay.ingest(part(1));

        let subscribers: Vec<_> = (0..5).map(|_| relay.subscribe().unwrap()).collect();
        relay.stop();

        for handle in &subscribers {
            let delivery = handle
                .recv_timeout(relay.config().queue_timeout)
                .await
                .unwrap();
            assert!(matches!(delivery, Delivery::Shutdown));
        }
        assert!(!relay.is_running());
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_frames_after_stop() {
        let relay = relay(immediate());
        relay.start_without_upstream();
        relay.stop();

        assert!(!relay.ingest(part(1)));
        assert!(relay.cached_frames().is_empty());
        assert!(relay.last_frame().is_none());
        assert!(matches!(
            relay.subscribe(),
            Err(RelayError::Unavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_running_before_start() {
        let relay = relay(immediate());

        assert_eq!(relay.state(), RelayState::Created);
        assert!(!relay.ingest(part(1)));

        // Subscribing early is allowed; frames flow once started.
        let handle = relay.subscribe().unwrap();
        relay.start_without_upstream();
        relay.ingest(part(2));
        assert_eq!(next_frame(&handle).await.jpeg(), Bytes::from(jpeg(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_idempotent() {
        let relay = relay(immediate());
        relay.start_without_upstream();

        let a = relay.subscribe().unwrap();
        let _b = relay.subscribe().unwrap();
        assert_eq!(relay.subscriber_count(), 2);

        relay.unsubscribe(&a);
        relay.unsubscribe(&a);
        assert_eq!(relay.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_idempotent() {
        let camera = FakeCamera::start(vec![multipart_part(&jpeg(1))]).await;
        let relay = Arc::new(Relay::new(camera.url(), immediate()).unwrap());

        relay.start();
        relay.start();
        assert_eq!(relay.state(), RelayState::Running);

        let handle = relay.subscribe().unwrap();
        assert_eq!(next_frame(&handle).await.jpeg(), Bytes::from(jpeg(1)));

        let stats = relay.stats();
        assert_eq!(stats.puller_starts, 1);
        assert_eq!(camera.connections(), 1);

        relay.stop();
        let after_first = relay.stats();
        relay.stop();
        let after_second = relay.stats();

        // The camera sees its connection closed.
        assert!(camera.wait_closed(1, Duration::from_secs(5)).await);
        assert_eq!(camera.closed(), 1);

        assert_eq!(after_first.state, RelayState::Stopped);
        assert!(!after_first.running);
        assert_eq!(after_first, after_second);

        // Starting a stopped relay does nothing.
        relay.start();
        assert_eq!(relay.state(), RelayState::Stopped);
        assert_eq!(relay.stats().puller_starts, 1);
    }
}
