use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{error::StartupError, sink::OutputFormat};

/// Hard cap on how large a `--data` template file may be; this is a sanity
/// bound, not a protocol limit.
const MAX_TEMPLATE_SIZE: u32 = 64 * 1024;

#[derive(Debug, Parser)]
#[command(name = "bannerscan", about = "Scans a list of IPv4 addresses read from stdin and reports what, if anything, answers on a TCP port")]
pub struct Cli {
    /// Maximum number of connections in flight at once. The open-file limit
    /// is raised to match this value before the reactor starts.
    #[arg(short = 'c', long = "concurrent", default_value_t = 1_000_000)]
    pub concurrent: u32,

    /// TCP port to probe on every target.
    #[arg(short = 'p', long = "port")]
    pub port: u16,

    /// Seconds to wait for a connection to complete before giving up on it.
    #[arg(short = 't', long = "conn-timeout", default_value_t = 5)]
    pub conn_timeout_secs: u64,

    /// Seconds to wait for a response after connecting before giving up.
    #[arg(short = 'r', long = "read-timeout", default_value_t = 5)]
    pub read_timeout_secs: u64,

    /// Verbosity: 0 is errors only, higher values progressively enable
    /// warn/info/debug/trace. Defaults to 2 (info), matching the source's
    /// unconditional `log_init(stderr, LOG_INFO)`.
    #[arg(short = 'v', long = "verbosity", default_value_t = 2)]
    pub verbosity: u8,

    /// Path to a file whose contents are sent to every target after connect.
    /// `%s` is replaced (up to 4 times) with the target's dotted-quad
    /// address.
    #[arg(short = 'd', long = "data")]
    pub data: Option<PathBuf>,

    /// Only report targets whose response contains this substring. If
    /// omitted, any non-empty response is reported.
    #[arg(short = 's', long = "search-string")]
    pub search_string: Option<String>,

    /// Output format for matches.
    #[arg(short = 'f', long = "format", value_enum, default_value = "ip-and-body")]
    pub format: OutputFormat,

    /// Largest single read performed per connection, in bytes. The scanner
    /// only cares about the first readable chunk, so anything beyond this
    /// is left unconsumed when the connection is torn down.
    #[arg(short = 'm', long = "max-read-size", default_value_t = 16 * 1024 * 1024)]
    pub max_read_size: u32,
}

/// Validated, ready-to-run configuration. Distinct from [`Cli`] because a
/// handful of fields need parsing/IO (the template file) or range checks
/// clap's derive can't express directly.
pub struct Config {
    pub concurrent: u32,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub verbosity: u8,
    pub template: Option<Vec<u8>>,
    pub search_string: Option<String>,
    pub format: OutputFormat,
    pub max_read_size: u32,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, StartupError> {
        if cli.port == 0 {
            return Err(StartupError::InvalidPort(u32::from(cli.port)));
        }
        if cli.verbosity > 5 {
            return Err(StartupError::InvalidVerbosity(cli.verbosity));
        }

        let template = cli.data.map(read_template).transpose()?;

        Ok(Self {
            concurrent: cli.concurrent.max(1),
            port: cli.port,
            connect_timeout: Duration::from_secs(cli.conn_timeout_secs),
            read_timeout: Duration::from_secs(cli.read_timeout_secs),
            verbosity: cli.verbosity,
            template,
            search_string: cli.search_string,
            format: cli.format,
            max_read_size: cli.max_read_size.max(1),
        })
    }
}

fn read_template(path: PathBuf) -> Result<Vec<u8>, StartupError> {
    let meta = fs::metadata(&path).map_err(|source| StartupError::TemplateFile { path: path.clone(), source })?;
    if meta.len() > u64::from(MAX_TEMPLATE_SIZE) {
        return Err(StartupError::TemplateTooLarge { path, len: meta.len(), max: MAX_TEMPLATE_SIZE });
    }
    fs::read(&path).map_err(|source| StartupError::TemplateFile { path, source })
}

/// Raises `RLIMIT_NOFILE` to cover `max_concurrent` in-flight sockets plus a
/// handful for stdio/the feeder fd, clamped to the hard limit. Must run
/// after flag parsing, using the final, validated `--concurrent` value —
/// the source raises the limit before parsing flags, so a malformed
/// argument can never influence it.
pub fn raise_fd_limit(max_concurrent: u32) -> Result<(), StartupError> {
    let requested = u64::from(max_concurrent) + 16;
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `limit` is a valid, correctly sized out-param for getrlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(StartupError::RlimitRaise { requested, source: std::io::Error::last_os_error() });
    }

    let target = requested.min(limit.rlim_max);
    if target <= limit.rlim_cur {
        return Ok(());
    }

    limit.rlim_cur = target;
    // SAFETY: `limit` has just been read from the kernel and only `rlim_cur`
    // was raised, so this call can only narrow or match the hard limit.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        return Err(StartupError::RlimitRaise { requested, source: std::io::Error::last_os_error() });
    }
    Ok(())
}
