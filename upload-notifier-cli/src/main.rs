use clap::Parser;
use upload_notifier_core::{execute_upload_notifier, style, CoreCliArgs};

#[tokio::main]
async fn main() {
    let cli_args = CoreCliArgs::parse();
    if let Err(e) = execute_upload_notifier(cli_args).await {
        eprintln!(
            "{} {} {}",
            style("❌"),
            style("upload-notifier failed:").red().bold(),
            style(format!("{e:#}")).red()
        );
        std::process::exit(1);
    }
}
