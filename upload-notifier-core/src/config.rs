// settings loaded from the environment (optionally seeded from a .env file)

use crate::error::ConfigError;
use crate::notifier::DEFAULT_TELEGRAM_API_URL;
use crate::patterns::PatternList;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

pub const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const CHAT_ID: &str = "CHAT_ID";
pub const RCLONE_CACHE_DIR: &str = "RCLONE_CACHE_DIR";
pub const JOB_NAME: &str = "JOB_NAME";
pub const TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
pub const REQUEUE_FAILED: &str = "REQUEUE_FAILED";
pub const UPLOAD_LOG_FILE: &str = "UPLOAD_LOG_FILE";

/// default log file name, placed next to the executable
pub const DEFAULT_LOG_FILE_NAME: &str = "upload.log";

/// everything the supervisor needs to run
#[derive(Clone)]
pub struct Settings {
    pub telegram_token: String,
    pub chat_id: String,
    pub watch_dir: PathBuf,
    pub job_name: String,
    pub patterns: PatternList,
    pub telegram_api_url: String,
    pub requeue_failed: bool,
}

// the token must not end up in logs
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("telegram_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("watch_dir", &self.watch_dir)
            .field("job_name", &self.job_name)
            .field("patterns", &self.patterns.len())
            .field("telegram_api_url", &self.telegram_api_url)
            .field("requeue_failed", &self.requeue_failed)
            .finish()
    }
}

impl Settings {
    /// read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// read settings through `lookup`. empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        // check in the order the variables are documented so the first complaint is stable
        let telegram_token = require(TELEGRAM_TOKEN)?;
        let chat_id = require(CHAT_ID)?;
        let watch_dir = PathBuf::from(require(RCLONE_CACHE_DIR)?);
        let job_name = require(JOB_NAME)?;

        if !watch_dir.is_dir() {
            return Err(ConfigError::WatchDirectory(watch_dir));
        }
        // relative paths resolve against the working directory at startup
        let watch_dir = watch_dir
            .canonicalize()
            .map_err(|_| ConfigError::WatchDirectory(watch_dir))?;

        let patterns = PatternList::from_lookup(&lookup)?;

        Ok(Self {
            telegram_token,
            chat_id,
            watch_dir,
            job_name,
            patterns,
            telegram_api_url: get(TELEGRAM_API_URL)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            requeue_failed: get(REQUEUE_FAILED).is_some_and(|v| parse_flag(&v)),
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// load `.env` style variables. an explicit file must exist; the default `./.env` is optional.
/// variables already present in the environment win
pub fn load_env_file(path: Option<&Path>) -> anyhow::Result<()> {
    use anyhow::Context;

    match path {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    Ok(())
}

/// where the log file goes: explicit path, then UPLOAD_LOG_FILE, then upload.log beside the binary
pub fn resolve_log_file(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env::var_os(UPLOAD_LOG_FILE).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_LOG_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_NAME))
}
