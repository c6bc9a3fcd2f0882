use std::fmt;
use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::client::{build_http_client, endpoint, parse_server_url};
use crate::error::Result;
use crate::server::handlers::UPLOAD_FIELD;

/// Result of one upload attempt. Failures are values, never errors: the
/// watcher loop that drives uploads must keep running whatever happens.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Success { filename: String },
    /// The server answered with a non-success status; message from its body
    ServerRejected(String),
    /// No response was obtained (file unreadable, connection refused, reset, ...)
    TransportFailure(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Success { filename } => write!(f, "uploaded {}", filename),
            UploadOutcome::ServerRejected(msg) => write!(f, "server rejected upload: {}", msg),
            UploadOutcome::TransportFailure(msg) => write!(f, "transport failure: {}", msg),
        }
    }
}

/// Sends single files to a pixelsync server's `/upload/` endpoint.
///
/// No retries: a failed file is only sent again if the filesystem reports it
/// as created again.
#[derive(Clone)]
pub struct UploadClient {
    client: Client,
    server_url: Url,
    upload_url: Url,
}

impl UploadClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let server_url = parse_server_url(server_url)?;
        let upload_url = endpoint(&server_url, &["upload", ""])?;
        Ok(Self {
            client: build_http_client()?,
            server_url,
            upload_url,
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Upload the file at `path` under its base name. Logs one line per outcome.
    pub async fn upload(&self, path: &Path) -> UploadOutcome {
        let outcome = self.send_file(path).await;
        match &outcome {
            UploadOutcome::Success { .. } => {
                log::info!("Successfully uploaded {}", path.display());
            }
            UploadOutcome::ServerRejected(msg) => {
                log::warn!("Failed to upload {}: {}", path.display(), msg);
            }
            UploadOutcome::TransportFailure(msg) => {
                log::error!("Error uploading {}: {}", path.display(), msg);
            }
        }
        outcome
    }

    async fn send_file(&self, path: &Path) -> UploadOutcome {
        let filename = match path.file_name().map(|name| name.to_str()) {
            Some(Some(name)) => name.to_string(),
            Some(None) => {
                return UploadOutcome::TransportFailure(format!(
                    "file name of {} is not valid UTF-8",
                    path.display()
                ));
            }
            None => {
                return UploadOutcome::TransportFailure(format!(
                    "{} has no file name",
                    path.display()
                ));
            }
        };

        // The file may have been moved or deleted since the event fired
        let opened = async {
            let file = tokio::fs::File::open(path).await?;
            let size = file.metadata().await?.len();
            Ok::<_, std::io::Error>((file, size))
        }
        .await;
        let (file, size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                return UploadOutcome::TransportFailure(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                ));
            }
        };

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size).file_name(filename.clone());
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = match self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return UploadOutcome::TransportFailure(format!("Network error: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            log::debug!("{} ({} bytes) accepted with {}", filename, size, status);
            return UploadOutcome::Success { filename };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        UploadOutcome::ServerRejected(rejection_message(status, &body))
    }
}

/// Prefer the server's `{"message": ...}`; fall back to status + raw body
fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()))
}
