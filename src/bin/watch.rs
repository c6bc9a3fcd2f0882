//! Watch a folder and upload every new file to a pixelsync server.

use anyhow::{Context, Result};
use clap::Parser;
use pixelsync::{Config, UploadClient, WatchSession};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Upload new files from a folder to a pixelsync server")]
struct Args {
    /// Folder to watch (created if missing; overrides watch.directory)
    watch_directory: Option<PathBuf>,

    /// Server base URL, e.g. http://localhost:8000 (overrides watch.server_url)
    server_url: Option<String>,

    /// Delay in milliseconds between a file appearing and reading it
    #[arg(long)]
    settle_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.pixelsync.log_level.as_str()),
    )
    .init();

    if let Some(url) = args.server_url {
        config.watch.server_url = url;
    }
    if let Some(ms) = args.settle_ms {
        config.watch.settle_ms = ms;
    }
    let dir = args
        .watch_directory
        .or_else(|| config.watch.directory.clone())
        .context("Usage: watch <watch_directory> <server_url> (or set watch.directory in config.toml)")?;

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create watch directory: {}", dir.display()))?;

    log::info!("Watching {} for new files...", dir.display());
    log::info!("Server URL: {}", config.watch.server_url);
    log::info!("Settle delay: {:?}", Duration::from_millis(config.watch.settle_ms));

    let client = UploadClient::new(&config.watch.server_url)?;
    let session = WatchSession::start(&dir, client, tokio::runtime::Handle::current(), config.watch.settle())?;

    log::info!("Drop files into the watch directory to upload them (Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;

    tokio::task::spawn_blocking(move || session.stop())
        .await
        .context("watch session shutdown")?;
    Ok(())
}
