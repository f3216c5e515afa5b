// error types shared across the pipeline

use std::path::PathBuf;
use thiserror::Error;

/// problems with the settings, found before the watcher starts. always fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("watch directory {} does not exist or is not a directory", .0.display())]
    WatchDirectory(PathBuf),

    #[error("{key} is not a valid regular expression: {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("{key} has no capture group, so it cannot yield a canonical name")]
    PatternWithoutGroup { key: String },
}

/// failures of the filesystem watch. the process has no purpose without it
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start watching {}: {source}", path.display())]
    Start {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watched directory {} disappeared", .0.display())]
    RootRemoved(PathBuf),

    #[error("filesystem event stream closed unexpectedly")]
    StreamClosed,
}

/// transport failures from the messaging endpoint. logged and skipped by the scheduler
#[derive(Debug, Error)]
pub enum SendError {
    #[error("network error talking to telegram: {0}")]
    Network(#[from] reqwest::Error),

    #[error("telegram rejected the bot token ({status})")]
    Unauthorized { status: u16 },

    #[error("telegram rate limit hit, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("telegram api error ({status}): {description}")]
    Api { status: u16, description: String },
}

impl SendError {
    /// whether the same message could go through later. bad requests and a rejected token
    /// will fail the same way every time
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Network(_) | SendError::RateLimited { .. } => true,
            SendError::Api { status, .. } => *status >= 500,
            SendError::Unauthorized { .. } => false,
        }
    }
}
