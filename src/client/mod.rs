//! HTTP clients for the two sides of a sync: the uploader that feeds the server
//! and the receiving device that discovers and downloads new files.

pub mod discovery;
pub mod upload;

pub use discovery::{DiscoveryClient, NewFiles, Poller};
pub use upload::{UploadClient, UploadOutcome};

use reqwest::Client;
use url::Url;

use crate::error::{Result, SyncError};

/// Parse and check a server base URL such as `http://192.168.1.20:8000`
pub fn parse_server_url(server_url: &str) -> Result<Url> {
    let url = Url::parse(server_url)
        .map_err(|e| SyncError::Config(format!("invalid server URL {}: {}", server_url, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SyncError::Config(format!(
            "server URL must use http or https: {}",
            server_url
        )));
    }
    if url.cannot_be_a_base() {
        return Err(SyncError::Config(format!("server URL cannot be a base: {}", server_url)));
    }
    Ok(url)
}

/// Append path segments to `base`, keeping any path prefix it already has.
/// Segments are percent-encoded.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SyncError::Config(format!("server URL cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// No request timeout: large uploads over slow links must not be cut off.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("pixelsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::Http(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_url() {
        assert!(parse_server_url("http://localhost:8000").is_ok());
        assert!(parse_server_url("https://pc.lan/sync/").is_ok());
        assert!(matches!(parse_server_url("localhost:8000"), Err(SyncError::Config(_))));
        assert!(matches!(parse_server_url("ftp://pc.lan"), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_endpoint_paths() {
        let root = parse_server_url("http://localhost:8000").unwrap();
        assert_eq!(
            endpoint(&root, &["upload", ""]).unwrap().as_str(),
            "http://localhost:8000/upload/"
        );

        let prefixed = parse_server_url("http://pc.lan/sync/").unwrap();
        assert_eq!(
            endpoint(&prefixed, &["check_new_files", "12.5"]).unwrap().as_str(),
            "http://pc.lan/sync/check_new_files/12.5"
        );

        assert_eq!(
            endpoint(&root, &["download", "my photo#1.jpg"]).unwrap().as_str(),
            "http://localhost:8000/download/my%20photo%231.jpg"
        );
    }
}
