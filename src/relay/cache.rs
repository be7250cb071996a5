//! Rolling frame cache
//!
//! Keeps the frames captured within a trailing time window. The window is the
//! jitter buffer behind the serve delay: frames wait here until they are old
//! enough to be released to subscribers.
//!
//! Every push drops the frames captured more than `window` before the newest
//! one, but only once they have been released. A frame still waiting out the
//! serve delay is never evicted, whatever the window.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::stats::CacheStats;

use super::frame::Frame;

#[derive(Debug, Default)]
struct CacheInner {
    frames: VecDeque<Frame>,
    /// Frames at the front of `frames` already handed out by `take_due`
    released: usize,
    frames_received: u64,
    frames_served: u64,
}

/// Time-windowed frame cache with its own lock
#[derive(Debug)]
pub struct FrameCache {
    window: Duration,
    inner: Mutex<CacheInner>,
}

impl FrameCache {
    /// Create a cache holding `window` worth of frames
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Get the retention window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a frame and evict frames that fell out of the window
    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock();
        let newest = frame.captured_at();

        inner.frames.push_back(frame);
        inner.frames_received += 1;

        while inner.released > 0 {
            let expired = inner
                .frames
                .front()
                .is_some_and(|f| newest.saturating_duration_since(f.captured_at()) > self.window);
            if !expired {
                break;
            }
            inner.frames.pop_front();
            inner.released -= 1;
        }

        if inner.frames_received % 100 == 0 {
            tracing::trace!(
                cached = inner.frames.len(),
                received = inner.frames_received,
                served = inner.frames_served,
                "Cache stats"
            );
        }
    }

    /// Most recent frame
    pub fn latest(&self) -> Option<Frame> {
        self.inner.lock().frames.back().cloned()
    }

    /// All frames in the window, oldest first
    pub fn frames(&self) -> Vec<Frame> {
        self.inner.lock().frames.iter().cloned().collect()
    }

    /// Number of frames in the window
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Take the frames that are due for release
    ///
    /// Returns, oldest first, every frame not yet released that was captured
    /// at least `delay` before `now`, together with the instant at which the
    /// next pending frame becomes due. Each frame is returned once.
    pub fn take_due(&self, now: Instant, delay: Duration) -> (Vec<Frame>, Option<Instant>) {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        let mut next_due = None;

        for frame in inner.frames.range(inner.released..) {
            let release_at = frame.captured_at() + delay;
            if release_at <= now {
                due.push(frame.clone());
            } else {
                next_due = Some(release_at);
                break;
            }
        }

        inner.released += due.len();
        inner.frames_served += due.len() as u64;
        (due, next_due)
    }

    /// Frames cached but not yet released
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock();
        inner.frames.len() - inner.released
    }

    /// Drop every cached frame
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.released = 0;
    }

    /// Snapshot of the cache state
    pub fn stats(&self, now: Instant) -> CacheStats {
        let inner = self.inner.lock();
        let age = |frame: Option<&Frame>| {
            frame
                .map(|f| now.saturating_duration_since(f.captured_at()))
                .unwrap_or_default()
        };

        CacheStats {
            frames_in_cache: inner.frames.len(),
            frames_received: inner.frames_received,
            frames_served: inner.frames_served,
            oldest_frame_age: age(inner.frames.front()),
            newest_frame_age: age(inner.frames.back()),
        }
    }
}
