use thiserror::Error;

/// Main error type for pixelsync
#[derive(Error, Debug)]
pub enum SyncError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filename rejected before touching the content directory
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Persisting an upload failed (write, flush, rename or a truncated body)
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP transport or unexpected server response
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem watch errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Stored file not found
    #[error("File not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<notify::Error> for SyncError {
    fn from(e: notify::Error) -> Self {
        SyncError::Watch(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Http(e.to_string())
    }
}

/// Convenient Result type using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;
