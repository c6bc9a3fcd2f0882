//! Receiving-device side: poll a pixelsync server and download what is new.

use anyhow::{Context, Result};
use clap::Parser;
use pixelsync::{Config, DiscoveryClient, Poller};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fetch")]
#[command(about = "Poll a pixelsync server and download newly arrived files")]
struct Args {
    /// Server base URL (overrides watch.server_url)
    server_url: Option<String>,

    /// Where downloaded files go (overrides fetch.dest_dir)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Start from this timestamp instead of the beginning
    #[arg(long, default_value_t = 0.0)]
    since: f64,

    /// Poll once and exit
    #[arg(long)]
    once: bool,
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
    if let Some(dest) = args.dest {
        config.fetch.dest_dir = dest;
    }

    let client = DiscoveryClient::new(&config.watch.server_url)?;
    let interval = Duration::from_secs(config.fetch.poll_interval_secs);
    let mut poller = Poller::new(client, &config.fetch.dest_dir, args.since);

    log::info!(
        "Polling {} every {:?} into {}",
        config.watch.server_url,
        interval,
        config.fetch.dest_dir.display()
    );

    loop {
        match poller.poll_once().await {
            Ok(fetched) => {
                if !fetched.is_empty() {
                    log::info!("Fetched {} new file(s)", fetched.len());
                }
            }
            Err(e) => log::error!("Fetch since {} failed, will retry: {}", poller.since(), e),
        }

        if args.once {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            res = tokio::signal::ctrl_c() => {
                res.context("failed to install Ctrl+C handler")?;
                break;
            }
        }
    }
    Ok(())
}
