use std::process::ExitCode;

use bannerscan::{
    config::{Cli, Config, raise_fd_limit},
    engine::Engine,
};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "bannerscan: startup failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_cli(cli)?;
    raise_fd_limit(config.concurrent)?;
    let mut engine = Engine::new(config)?;
    engine.run()?;
    Ok(())
}

/// 0 is errors-only; each additional `-v` enables the next level down to
/// trace at 5.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}
