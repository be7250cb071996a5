//! Relay directory
//!
//! Maps camera URLs to their relays. The first request for a URL creates and
//! starts the relay; every later request shares it, so a camera never sees
//! more than one connection from this process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::config::RelayConfig;
use super::entry::{Relay, RelayStats};
use super::error::RelayError;

#[derive(Debug, Default)]
struct DirectoryInner {
    relays: HashMap<String, Arc<Relay>>,
    closed: bool,
}

/// Directory of live relays, keyed by camera URL
#[derive(Debug)]
pub struct RelayDirectory {
    inner: Mutex<DirectoryInner>,
    config: RelayConfig,
}

impl RelayDirectory {
    /// Create an empty directory; every relay it creates uses `config`
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Mutex::new(DirectoryInner::default()),
            config,
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Build the camera URL for a host, port and path
    pub fn stream_url(host: &str, port: u16, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}:{}{}", host, port, path)
        } else {
            format!("http://{}:{}/{}", host, port, path)
        }
    }

    /// Get the relay for `url`, creating and starting it on first use
    ///
    /// Lookup, construction and insertion happen under one lock, so
    /// concurrent first requests for a URL all receive the same relay.
    /// Must be called within a tokio runtime.
    pub fn get_or_create(&self, url: &str) -> Result<Arc<Relay>, RelayError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RelayError::Unavailable(url.to_string()));
        }

        if let Some(relay) = inner.relays.get(url) {
            return Ok(Arc::clone(relay));
        }

        let relay = Arc::new(Relay::new(url, self.config.clone())?);
        relay.start();
        inner.relays.insert(url.to_string(), Arc::clone(&relay));

        tracing::info!(url = %url, relays = inner.relays.len(), "Relay created");

        Ok(relay)
    }

    /// Get the relay for `url` if one exists
    pub fn get(&self, url: &str) -> Option<Arc<Relay>> {
        self.inner.lock().relays.get(url).cloned()
    }

    /// Number of relays
    pub fn len(&self) -> usize {
        self.inner.lock().relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Camera URLs with a relay, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.inner.lock().relays.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Statistics for every relay, sorted by URL
    pub fn stats(&self) -> Vec<RelayStats> {
        let relays: Vec<Arc<Relay>> = self.inner.lock().relays.values().cloned().collect();
        let mut stats: Vec<RelayStats> = relays.iter().map(|r| r.stats()).collect();
        stats.sort_by(|a, b| a.url.cmp(&b.url));
        stats
    }

    /// Stop every relay and refuse new ones
    ///
    /// Idempotent: a second call finds the directory already drained.
    pub fn stop_all(&self) {
        let relays: Vec<Arc<Relay>> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.relays.drain().map(|(_, relay)| relay).collect()
        };

        if relays.is_empty() {
            return;
        }

        tracing::info!(relays = relays.len(), "Stopping all relays");

        for relay in relays {
            relay.stop();
        }
    }
}

impl Default for RelayDirectory {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
