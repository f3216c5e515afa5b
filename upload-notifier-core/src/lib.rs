// upload-notifier-core/src/lib.rs

// declare modules
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifier;
pub mod patterns;
pub mod scheduler;
pub mod supervisor;

// re-export key structs/functions for external use by other crates
pub use anyhow::{Context, Result}; // re-export for convenience
pub use clap::Parser; // re-export Parser for CLI crate
pub use console::style; // re-export for the CLI's error output
pub use tracing::{error, info};

pub use crate::buffer::{BufferedLine, NotificationBuffer};
pub use crate::config::Settings;
pub use crate::error::{ConfigError, SendError, WatchError};
pub use crate::events::{Classification, EventClassifier, WatchEvent, WatchEventKind};
pub use crate::notifier::{Notifier, ParseMode, TelegramNotifier};
pub use crate::patterns::PatternList;
pub use crate::scheduler::{format_report, FlushOutcome, Scheduler};
pub use crate::supervisor::{shutdown_signal, Supervisor};

use std::path::PathBuf;

// argument parsing struct - shared by the CLI binary and anything embedding the core
#[derive(Parser, Debug, Clone)]
#[command(name = "upload-notifier")]
#[command(about = "hourly telegram reports of finished rclone vfs cache uploads", long_about = None)]
pub struct CoreCliArgs {
    /// load variables from this env file instead of ./.env
    #[arg(short, long)]
    pub env_file: Option<PathBuf>,

    /// write the log here (defaults to UPLOAD_LOG_FILE, then upload.log next to the binary)
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,

    /// log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    /// validate the configuration and patterns, print a summary and exit
    #[arg(long)]
    pub check: bool,
}

// the whole daemon: env, logging, settings, then watch until interrupted
pub async fn execute_upload_notifier(args: CoreCliArgs) -> Result<()> {
    config::load_env_file(args.env_file.as_deref())?;

    let log_file = config::resolve_log_file(args.log_file.as_deref());
    logging::init_logging(&log_file, args.verbose)?;

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return Err(e).context("invalid configuration");
        }
    };

    if args.check {
        print_check_summary(&settings);
        return Ok(());
    }

    info!(
        "starting upload notifier for '{}' with {} patterns",
        settings.job_name,
        settings.patterns.len()
    );

    let supervisor = Supervisor::from_settings(settings)?;
    if let Err(e) = supervisor.run_until(shutdown_signal()).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn print_check_summary(settings: &Settings) {
    println!("{}", style("configuration ok").green().bold());
    println!("  job name:   {}", style(&settings.job_name).cyan());
    println!("  chat id:    {}", settings.chat_id);
    println!("  watch dir:  {}", settings.watch_dir.display());
    println!("  api url:    {}", settings.telegram_api_url);
    println!("  requeue:    {}", settings.requeue_failed);
    if settings.patterns.is_empty() {
        println!(
            "{}",
            style("  no PATTERN_n set - finished uploads will only be logged").yellow()
        );
    } else {
        for key in settings.patterns.keys() {
            println!("  pattern:    {key}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CoreCliArgs::parse_from([
            "upload-notifier",
            "--env-file",
            "/etc/upload.env",
            "-l",
            "/tmp/u.log",
            "--verbose",
            "--check",
        ]);
        assert_eq!(args.env_file.as_deref(), Some(std::path::Path::new("/etc/upload.env")));
        assert_eq!(args.log_file.as_deref(), Some(std::path::Path::new("/tmp/u.log")));
        assert!(args.verbose);
        assert!(args.check);
    }

    #[test]
    fn flags_default_off() {
        let args = CoreCliArgs::parse_from(["upload-notifier"]);
        assert!(args.env_file.is_none());
        assert!(args.log_file.is_none());
        assert!(!args.verbose && !args.check);
    }
}
