use std::{io, path::PathBuf};

/// Fatal, startup-time failures. Every variant maps to exit code 1; none of
/// these ever surface once the reactor loop is running.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("port must be in 1..=65535, got {0}")]
    InvalidPort(u32),

    #[error("verbosity must be in 0..=5, got {0}")]
    InvalidVerbosity(u8),

    #[error("could not read send-template file {path}: {source}")]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("send-template file {path} is {len} bytes, exceeds the {max} byte limit")]
    TemplateTooLarge { path: PathBuf, len: u64, max: u32 },

    #[error("could not raise open-file limit to {requested}: {source}")]
    RlimitRaise {
        requested: u64,
        #[source]
        source: io::Error,
    },

    #[error("could not set up reactor: {0}")]
    ReactorInit(#[source] io::Error),
}
