use std::{
    io::{self, Read},
    net::Ipv4Addr,
    os::fd::AsRawFd,
    str::FromStr,
};

use mio::{Interest, Registry, Token, unix::SourceFd};
use tracing::warn;

const READ_CHUNK: usize = 8192;

/// Reads newline-delimited IPv4 addresses from stdin without blocking the
/// reactor thread.
///
/// Stdin is registered in the same `Poll` as every connection socket, so the
/// engine treats "more targets available" as just another readiness event
/// rather than running a separate reader thread.
pub struct Feeder {
    fd: i32,
    partial: Vec<u8>,
    pending: Vec<Ipv4Addr>,
    eof: bool,
}

impl Feeder {
    /// Takes ownership of stdin, sets it non-blocking, and registers it with
    /// `registry` under `token`.
    pub fn register(registry: &Registry, token: Token) -> io::Result<Self> {
        let stdin = io::stdin();
        let fd = stdin.as_raw_fd();
        set_nonblocking(fd)?;
        // Leak the io::Stdin handle's lifetime concerns by going straight to
        // the raw fd via SourceFd; stdin itself is process-global and never
        // closed out from under us.
        registry.register(&mut SourceFd(&fd), token, Interest::READABLE)?;
        Ok(Self { fd, partial: Vec::new(), pending: Vec::new(), eof: false })
    }

    /// Drains whatever is currently available on stdin into `self.pending`.
    /// Call after observing a readable event on the feeder's token.
    pub fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        let mut file = StdinFd(self.fd);
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    self.eof = true;
                    if !self.partial.is_empty() {
                        self.parse_line(std::mem::take(&mut self.partial));
                    }
                    return Ok(());
                }
                Ok(n) => self.consume(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn consume(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.parse_line(line);
            } else {
                self.partial.push(byte);
            }
        }
    }

    fn parse_line(&mut self, mut line: Vec<u8>) {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return;
        }
        match std::str::from_utf8(&line).ok().and_then(|s| Ipv4Addr::from_str(s.trim()).ok()) {
            Some(ip) => self.pending.push(ip),
            None => warn!(line = %String::from_utf8_lossy(&line), "skipping unparseable target line"),
        }
    }

    /// Takes the next ready-to-dispatch target, if any.
    pub fn next_target(&mut self) -> Option<Ipv4Addr> {
        if self.pending.is_empty() { None } else { Some(self.pending.remove(0)) }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True once stdin has hit EOF and every buffered line has been handed
    /// out via `next_target`.
    pub fn drained(&self) -> bool {
        self.eof && self.pending.is_empty()
    }
}

/// Thin `Read` wrapper over a raw, already-non-blocking fd so `fill` can
/// reuse the ordinary `read` plumbing without taking another owned `Stdin`
/// lock per call.
struct StdinFd(i32);

impl Read for StdinFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.0, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

fn set_nonblocking(fd: i32) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder_for_test() -> Feeder {
        Feeder { fd: -1, partial: Vec::new(), pending: Vec::new(), eof: false }
    }

    #[test]
    fn consumes_complete_lines() {
        let mut f = feeder_for_test();
        f.consume(b"10.0.0.1\n10.0.0.2\n");
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(f.next_target(), None);
    }

    #[test]
    fn retains_partial_line_across_chunks() {
        let mut f = feeder_for_test();
        f.consume(b"192.168.1.");
        assert_eq!(f.next_target(), None);
        f.consume(b"5\n");
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(192, 168, 1, 5)));
    }

    #[test]
    fn trims_cr_and_whitespace() {
        let mut f = feeder_for_test();
        f.consume(b"10.1.1.1\r\n  10.1.1.2 \n");
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 1, 1, 2)));
    }

    #[test]
    fn skips_malformed_lines_but_keeps_going() {
        let mut f = feeder_for_test();
        f.consume(b"not-an-ip\n10.0.0.9\n");
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut f = feeder_for_test();
        f.consume(b"\n\n10.0.0.1\n");
        assert_eq!(f.next_target(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
