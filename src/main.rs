use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixelsync::{Config, SessionManager, SyncServer, UploadClient};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pixelsync")]
#[command(about = "Receive files from a watched folder and let devices discover what is new")]
struct Args {
    /// Listen port (overrides server.port)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Directory uploaded files are stored in (overrides server.content_dir)
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion server only (default)
    Serve,
    /// Run the server and upload new files from a local folder to it
    Run {
        /// Folder to watch (overrides watch.directory)
        #[arg(short, long)]
        watch: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.pixelsync.log_level.as_str()),
    )
    .init();

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.content_dir {
        config.server.content_dir = dir;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(&config).await?,
        Command::Run { watch } => {
            if let Some(dir) = watch {
                config.watch.directory = Some(dir);
            }
            run_server_and_watch(&config).await?;
        }
    }

    Ok(())
}

/// Serve until the process is terminated
async fn run_server(config: &Config) -> Result<()> {
    log::info!("Starting pixelsync v{}", env!("CARGO_PKG_VERSION"));
    let server = SyncServer::bind(&config.server).await?;
    server.run().await?;
    Ok(())
}

/// Server plus a local watch session, stopped together on Ctrl+C
async fn run_server_and_watch(config: &Config) -> Result<()> {
    log::info!("Starting pixelsync v{}", env!("CARGO_PKG_VERSION"));

    let dir = config
        .watch
        .directory
        .clone()
        .context("No folder to watch. Pass --watch <dir> or set watch.directory in config.toml")?;

    let server = SyncServer::bind(&config.server).await?;
    let port = server.local_addr()?.port();
    let handle = server.spawn()?;
    log::info!("Server started on port {}", port);

    let mut local = config.server.clone();
    local.port = port;
    let client = UploadClient::new(&local.local_url())?;
    let mut sessions = SessionManager::new(client, tokio::runtime::Handle::current(), config.watch.settle());
    sessions
        .select_folder(&dir)
        .with_context(|| format!("Failed to watch folder: {}", dir.display()))?;

    log::info!("Watching for new files (Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;

    tokio::task::spawn_blocking(move || sessions.stop())
        .await
        .context("watch session shutdown")?;
    handle.shutdown().await?;
    log::info!("Server stopped");
    Ok(())
}
