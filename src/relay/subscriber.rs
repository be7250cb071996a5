//! Subscriber queues
//!
//! Each viewer gets its own bounded FIFO. The relay pushes into it without
//! ever waiting: when the queue is full the oldest frame is dropped to make
//! room, so one slow viewer can never hold up the others.
//!
//! At shutdown the relay places a sentinel in every queue. From then on the
//! queue yields [`Delivery::Shutdown`] immediately, whatever it held.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::frame::Frame;

/// Item received from a subscriber queue
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Next frame to write
    Frame(Frame),
    /// The relay stopped; the consumer should finish
    Shutdown,
}

/// No delivery arrived within the timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvTimeout;

impl std::fmt::Display for RecvTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timed out waiting for a frame")
    }
}

impl std::error::Error for RecvTimeout {}

/// Opaque subscriber identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct QueueState {
    frames: VecDeque<Frame>,
    shutdown: bool,
}

/// Bounded drop-oldest frame queue
#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push without waiting; returns `true` if an older frame was dropped
    pub(crate) fn push(&self, frame: Frame) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }

        let mut dropped = false;
        if state.frames.len() >= self.capacity {
            state.frames.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            dropped = true;
        }
        state.frames.push_back(frame);
        drop(state);

        self.notify.notify_one();
        dropped
    }

    /// Place the shutdown sentinel, discarding buffered frames
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.frames.clear();
        drop(state);

        self.notify.notify_one();
    }

    fn try_recv(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Some(Delivery::Shutdown);
        }
        state.frames.pop_front().map(Delivery::Frame)
    }

    async fn recv_timeout(&self, timeout: Duration) -> Result<Delivery, RecvTimeout> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.try_recv() {
                return Ok(delivery);
            }
            // A notification sent since the last check is kept as a permit.
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_recv().ok_or(RecvTimeout);
            }
        }
    }

    fn len(&self) -> usize {
        self.state.lock().frames.len()
    }
}

/// A viewer's handle on its queue
///
/// Returned by `Relay::subscribe`. The consumer drains it; the relay keeps
/// its own reference until `Relay::unsubscribe` or shutdown.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    joined_at: Instant,
    queue: Arc<SubscriberQueue>,
}

impl SubscriberHandle {
    pub(crate) fn new(id: SubscriberId, queue: Arc<SubscriberQueue>) -> Self {
        Self {
            id,
            joined_at: Instant::now(),
            queue,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// When the subscriber joined
    pub fn joined_at(&self) -> Instant {
        self.joined_at
    }

    /// Wait up to `timeout` for the next delivery
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Delivery, RecvTimeout> {
        self.queue.recv_timeout(timeout).await
    }

    /// Take the next delivery if one is ready
    pub fn try_recv(&self) -> Option<Delivery> {
        self.queue.try_recv()
    }

    /// Frames waiting in the queue
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &Arc<SubscriberQueue> {
        &self.queue
    }
}
