use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pixelsync: PixelsyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct PixelsyncConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PixelsyncConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Ingestion server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory uploaded files are stored in (flat, created at startup)
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            content_dir: default_content_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Watch folder + upload target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Folder whose new files are uploaded. Unset means "no watch session".
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Delay between a creation event and reading the file, so the writer can finish.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: None,
            server_url: default_server_url(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// Polling consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            dest_dir: default_dest_dir(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_settle_ms() -> u64 {
    500
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PIXELSYNC_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config = match std::env::var("PIXELSYNC_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    log::debug!("No config.toml found, using built-in defaults");
                    Config::default()
                }
            }
        };

        config.validate()?;

        Ok(config)
    }

    /// Parse a config file without validating it
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be greater than 0");
        }

        if self.fetch.poll_interval_secs == 0 {
            anyhow::bail!("fetch.poll_interval_secs must be greater than 0");
        }

        let url = url::Url::parse(&self.watch.server_url)
            .with_context(|| format!("watch.server_url is not a valid URL: {}", self.watch.server_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "watch.server_url must use http or https, got: {}",
                self.watch.server_url
            );
        }

        if let Some(dir) = &self.watch.directory {
            if dir.exists() && !dir.is_dir() {
                anyhow::bail!(
                    "watch.directory must be a directory, not a file: {}",
                    dir.display()
                );
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Upload target for a watcher running on the same machine as the server
    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

impl WatchConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
