use std::time::{Duration, Instant};

use tracing::info;

use crate::{clock::Repeater, stats::Stats};

/// Emits a single status line at most once per second, plus once more at
/// shutdown. Self-rearming; a missed tick is never caught up.
pub struct Reporter {
    tick: Repeater,
}

impl Default for Reporter {
    fn default() -> Self {
        Self { tick: Repeater::every(Duration::from_secs(1)) }
    }
}

impl Reporter {
    /// Emits the status line if the 1s interval has elapsed.
    pub fn maybe_report(&mut self, now: Instant, running: usize, max_concurrent: u32, stats: &Stats) {
        if self.tick.fired(now) {
            Self::emit(running, max_concurrent, stats);
        }
    }

    /// Unconditionally emits the status line; used once at shutdown.
    pub fn report_now(running: usize, max_concurrent: u32, stats: &Stats) {
        Self::emit(running, max_concurrent, stats);
    }

    fn emit(running: usize, max_concurrent: u32, stats: &Stats) {
        info!(
            running,
            max_concurrent,
            found = stats.found,
            initiated = stats.init_connected_hosts,
            connected = stats.connected_hosts,
            conn_timed_out = stats.conn_timed_out,
            read_timed_out = stats.read_timed_out,
            timed_out = stats.timed_out,
            completed = stats.completed_hosts,
            admission_failures = stats.admission_failures,
            "({running}/{max_concurrent} in use)",
        );
    }
}
