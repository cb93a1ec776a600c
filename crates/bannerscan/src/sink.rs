use std::{
    io::{self, Write},
    net::Ipv4Addr,
};

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    IpOnly,
    IpAndBody,
}

/// Line-oriented result sink. Every emission is assembled into a scratch
/// buffer and written with a single `write_all` + `flush`, so concurrent
/// emissions from different connection tasks can never interleave even
/// though they share one stdout handle.
pub struct ResultSink {
    format: OutputFormat,
    buf: Vec<u8>,
}

impl ResultSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format, buf: Vec::with_capacity(256) }
    }

    pub fn emit(&mut self, ip: Ipv4Addr, body: &[u8]) -> io::Result<()> {
        self.format_line(ip, body);

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(&self.buf)?;
        lock.flush()
    }

    fn format_line(&mut self, ip: Ipv4Addr, body: &[u8]) {
        self.buf.clear();
        write!(self.buf, "{ip}").expect("write to Vec<u8> is infallible");
        if self.format == OutputFormat::IpAndBody {
            self.buf.push(b' ');
            self.buf.extend_from_slice(body);
        }
        self.buf.push(b'\n');
    }
}
