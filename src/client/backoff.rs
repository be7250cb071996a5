//! Capped exponential reconnect backoff

use std::time::Duration;

use super::config::UpstreamConfig;

/// Reconnect delay generator
///
/// Starts at `initial`, grows by `multiplier` after every failure and never
/// exceeds `max`. A successful connection resets it. Multipliers below 1.0
/// (or NaN) are treated as 1.0.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_nan() {
            1.0
        } else {
            multiplier.max(1.0)
        };
        Self {
            initial,
            max: max.max(initial),
            multiplier,
            current: initial,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.backoff_initial,
            config.backoff_max,
            config.backoff_multiplier,
        )
    }

    /// Delay to wait before the next attempt; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    /// Go back to the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
