use std::{
    io,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use mio::{Events, Poll, Token};
use tracing::debug;

use crate::{
    config::Config,
    connection::{CloseReason, ConnOutcome, Connection, Phase},
    error::StartupError,
    feeder::Feeder,
    reporter::Reporter,
    sink::ResultSink,
    slab::Slab,
    stats::Stats,
    template,
};

/// Fixed token for stdin, registered alongside every connection socket in
/// the same `Poll`. Slab-derived tokens start at 0 and grow one at a time,
/// so this is picked far out of that range.
const FEEDER_TOKEN: Token = Token(usize::MAX);

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// The single-threaded reactor. Owns every connection, the target feed, and
/// the output/reporting sinks; `run` is the whole program once flags have
/// been parsed and validated.
pub struct Engine {
    poll: Poll,
    events: Events,
    conns: Slab<Connection>,
    feeder: Feeder,
    config: Config,
    stats: Stats,
    sink: ResultSink,
    reporter: Reporter,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let poll = Poll::new().map_err(StartupError::ReactorInit)?;
        let feeder = Feeder::register(poll.registry(), FEEDER_TOKEN).map_err(StartupError::ReactorInit)?;

        Ok(Self {
            events: Events::with_capacity(1024),
            conns: Slab::with_capacity(config.concurrent as usize),
            sink: ResultSink::new(config.format),
            feeder,
            poll,
            stats: Stats::default(),
            reporter: Reporter::default(),
            config,
        })
    }

    /// Drives the reactor until every target has been read from stdin and
    /// every connection it spawned has reached a terminal state.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            let now = Instant::now();

            while self.conns.len() < self.config.concurrent as usize && self.admit(now) {}

            if self.feeder.drained() && self.conns.is_empty() {
                break;
            }

            self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;

            // Copied out up front: `self.events` is a field of `self`, and
            // reacting to each readiness notification needs `&mut self` (to
            // reach the registry, stats, and sink), so the borrow of
            // `self.events` can't be held across the loop body.
            let triggered: Vec<(Token, bool, bool)> =
                self.events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();

            let mut saw_feeder_event = false;
            for (token, readable, writable) in triggered {
                if token == FEEDER_TOKEN {
                    saw_feeder_event = true;
                } else {
                    self.handle_conn_event(token, readable, writable, now);
                }
            }

            if saw_feeder_event {
                self.feeder.fill()?;
            }

            self.sweep_timeouts(Instant::now());
            self.reporter.maybe_report(Instant::now(), self.conns.len(), self.config.concurrent, &self.stats);
        }

        Reporter::report_now(self.conns.len(), self.config.concurrent, &self.stats);
        Ok(())
    }

    /// Admits one more target if the feeder has one ready. Returns `false`
    /// when there is nothing left to admit right now.
    fn admit(&mut self, now: Instant) -> bool {
        let Some(ip) = self.feeder.next_target() else { return false };

        let idx = self.conns.reserve();
        let token = Token(idx);
        let connect_deadline = now + self.config.connect_timeout;
        let payload = self.config.template.as_deref().map(|t| template::render(t, ip));

        match Connection::connect(
            self.poll.registry(),
            token,
            ip,
            self.config.port,
            connect_deadline,
            payload,
            self.config.max_read_size,
        ) {
            Ok(conn) => {
                self.conns.fill(idx, conn);
                self.stats.init_connected_hosts += 1;
            }
            Err(err) => {
                debug!(%ip, %err, "admission failed");
                self.conns.cancel(idx);
                self.stats.init_connected_hosts += 1;
                self.stats.admission_failures += 1;
                self.stats.completed_hosts += 1;
            }
        }
        true
    }

    fn handle_conn_event(&mut self, token: Token, readable: bool, writable: bool, now: Instant) {
        let idx = token.0;
        let Some(conn) = self.conns.get_mut(idx) else {
            // Stale event for a token already recycled by a later admit.
            return;
        };

        let was_connecting = conn.phase() == Phase::Connecting;
        let read_deadline = now + self.config.read_timeout;
        let outcome = conn.on_event(self.poll.registry(), readable, writable, read_deadline);

        if was_connecting && self.conns.get(idx).map(Connection::phase) == Some(Phase::Connected) {
            self.stats.connected_hosts += 1;
        }

        match outcome {
            ConnOutcome::Pending => {}
            ConnOutcome::Data(body) => {
                let ip = self.conns.get(idx).map(Connection::ip);
                self.close_conn(idx);
                if let Some(ip) = ip {
                    self.finish_data(ip, &body);
                }
            }
            ConnOutcome::Closed(reason) => {
                self.close_conn(idx);
                self.account_close(reason);
            }
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        let expired: Vec<(usize, CloseReason)> = self
            .conns
            .iter_indices()
            .filter_map(|idx| {
                let conn = self.conns.get(idx)?;
                if now < conn.deadline() {
                    return None;
                }
                let reason =
                    if conn.phase() == Phase::Connecting { CloseReason::ConnectTimedOut } else { CloseReason::ReadTimedOut };
                Some((idx, reason))
            })
            .collect();

        for (idx, reason) in expired {
            self.close_conn(idx);
            self.account_close(reason);
        }
    }

    fn close_conn(&mut self, idx: usize) {
        if let Some(conn) = self.conns.get_mut(idx) {
            conn.close(self.poll.registry());
        }
        self.conns.remove(idx);
    }

    fn finish_data(&mut self, ip: Ipv4Addr, body: &[u8]) {
        self.stats.completed_hosts += 1;
        let matched = match &self.config.search_string {
            Some(needle) => contains_subslice(body, needle.as_bytes()),
            None => !body.is_empty(),
        };
        if matched {
            self.stats.found += 1;
            if let Err(err) = self.sink.emit(ip, body) {
                debug!(%ip, %err, "failed to write result");
            }
        }
    }

    fn account_close(&mut self, reason: CloseReason) {
        self.stats.completed_hosts += 1;
        match reason {
            CloseReason::ConnectFailed | CloseReason::ConnectTimedOut => {
                self.stats.conn_timed_out += 1;
                self.stats.timed_out += 1;
            }
            CloseReason::ReadTimedOut => {
                self.stats.read_timed_out += 1;
                self.stats.timed_out += 1;
            }
            // A zero-byte close or a read-syscall error after a successful
            // connect is a completed scan with nothing to report, not a
            // timeout: the peer answered (or at least accepted), it just
            // didn't send anything usable.
            CloseReason::PeerClosedNoData | CloseReason::Io => {}
        }
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
