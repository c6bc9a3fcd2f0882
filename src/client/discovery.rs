use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, DATE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use url::Url;
use uuid::Uuid;

use crate::client::{build_http_client, endpoint, parse_server_url};
use crate::error::{Result, SyncError};
use crate::store::validate_filename;

/// How far behind the server's clock a poll cursor is placed. `Date` has
/// one-second resolution, so the margin must exceed a second.
pub const CURSOR_OVERLAP_SECS: f64 = 2.0;

#[derive(Deserialize)]
struct NewFilesResponse {
    new_files: Vec<String>,
}

/// One discovery answer plus the server's clock when it answered
#[derive(Debug, Clone, PartialEq)]
pub struct NewFiles {
    pub names: Vec<String>,
    /// Seconds since the epoch, from the response `Date` header
    pub server_time: Option<f64>,
}

/// Parse the HTTP `Date` header into epoch seconds
fn server_time(headers: &HeaderMap) -> Option<f64> {
    let value = headers.get(DATE)?.to_str().ok()?;
    let parsed = DateTime::parse_from_rfc2822(value).ok()?;
    Some(parsed.timestamp() as f64)
}

/// Receiving-device client: asks what arrived since a timestamp and fetches it
#[derive(Clone)]
pub struct DiscoveryClient {
    client: Client,
    server_url: Url,
}

impl DiscoveryClient {
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            server_url: parse_server_url(server_url)?,
        })
    }

    /// GET /check_new_files/{since}
    pub async fn check_new_files(&self, since: f64) -> Result<Vec<String>> {
        Ok(self.new_files(since).await?.names)
    }

    /// Like `check_new_files`, keeping the server's clock reading alongside
    pub async fn new_files(&self, since: f64) -> Result<NewFiles> {
        let url = endpoint(&self.server_url, &["check_new_files", &since.to_string()])?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Http(format!("check_new_files returned {}: {}", status, body)));
        }

        let server_time = server_time(response.headers());
        let parsed: NewFilesResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Http(format!("Failed to parse response: {}", e)))?;
        Ok(NewFiles {
            names: parsed.new_files,
            server_time,
        })
    }

    /// GET /download/{name} into `dest_dir/name`, replacing any local copy.
    ///
    /// The name comes from the server, so it is validated like an upload name
    /// before anything is written locally.
    pub async fn download(&self, name: &str, dest_dir: &Path) -> Result<PathBuf> {
        validate_filename(name)?;
        let url = endpoint(&self.server_url, &["download", name])?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(SyncError::NotFound(name.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Http(format!("download of {} returned {}: {}", name, status, body)));
            }
            _ => {}
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let final_path = dest_dir.join(name);
        let temp_path = dest_dir.join(format!(".{}.part", Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &final_path).await?;
            Ok::<(), SyncError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(final_path)
    }

    /// Download every file that arrived after `since`.
    ///
    /// Stops at the first failed download so the caller can keep its cursor
    /// and ask for the same window again.
    pub async fn fetch_new(&self, since: f64, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let names = self.check_new_files(since).await?;
        self.download_all(&names, dest_dir).await
    }

    async fn download_all(&self, names: &[String], dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut fetched = Vec::new();

        for name in names {
            // A name re-uploaded twice in the window only needs its latest bytes
            if !seen.insert(name.as_str()) {
                continue;
            }
            let path = self.download(name, dest_dir).await?;
            log::info!("Fetched {}", path.display());
            fetched.push(path);
        }
        Ok(fetched)
    }
}

/// Poll loop state for a receiving device.
///
/// The cursor follows the server's clock, never the local one: arrivals are
/// stamped by the server, and a local clock running ahead would skip files.
/// The cursor trails the server's answer by `CURSOR_OVERLAP_SECS`, so a file
/// near the boundary may be fetched twice. Downloads overwrite, so that is harmless.
pub struct Poller {
    client: DiscoveryClient,
    dest_dir: PathBuf,
    since: f64,
}

impl Poller {
    pub fn new(client: DiscoveryClient, dest_dir: impl Into<PathBuf>, since: f64) -> Self {
        Self {
            client,
            dest_dir: dest_dir.into(),
            since,
        }
    }

    pub fn since(&self) -> f64 {
        self.since
    }

    /// Download everything new. The cursor only moves when every download succeeded.
    pub async fn poll_once(&mut self) -> Result<Vec<PathBuf>> {
        let batch = self.client.new_files(self.since).await?;
        let fetched = self.client.download_all(&batch.names, &self.dest_dir).await?;

        match batch.server_time {
            Some(now) => self.since = self.since.max(now - CURSOR_OVERLAP_SECS),
            None => log::warn!("server sent no usable Date header, keeping cursor at {}", self.since),
        }
        Ok(fetched)
    }
}
