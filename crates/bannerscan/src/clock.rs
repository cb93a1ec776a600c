use std::time::{Duration, Instant};

/// Fires at most once per `interval`, checked on demand rather than through an
/// OS timer. Mirrors the reconnect-interval gate used by the connector this
/// engine's reactor loop is modeled on: no catch-up for missed ticks, just a
/// last-fired timestamp compared against now.
#[derive(Debug)]
pub struct Repeater {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Repeater {
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_fired: None }
    }

    /// Returns true at most once per `interval`. The first call after
    /// construction (or after `force_fire`) always fires.
    pub fn fired(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    pub fn force_fire(&mut self) {
        self.last_fired = None;
    }
}
