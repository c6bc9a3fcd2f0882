//! Content directory: flat on-disk storage for uploaded bytes.
//!
//! Uploads are streamed into a staging file under `.partial/` and renamed onto
//! their final name only after the whole body has been written and synced, so a
//! reader of the content directory never sees a half-written file under a real name.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Staging subdirectory inside the content directory. Reserved as a filename.
pub const STAGING_DIR: &str = ".partial";

/// Longest accepted filename, in bytes (common filesystem limit)
pub const MAX_FILENAME_BYTES: usize = 255;

/// Check that `name` is a plain file name that cannot escape the content directory.
///
/// Names are rejected, never rewritten: the receiving side asks for files by the
/// exact name the uploader used.
pub fn validate_filename(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(SyncError::InvalidFilename("filename cannot be empty".to_string()));
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(SyncError::InvalidFilename(format!(
            "filename longer than {} bytes",
            MAX_FILENAME_BYTES
        )));
    }
    if name == "." || name == ".." || name == STAGING_DIR {
        return Err(SyncError::InvalidFilename(format!("reserved filename: {}", name)));
    }
    if name.contains('/') || name.contains('\\') {
        log::warn!("Path traversal attempt rejected: {:?}", name);
        return Err(SyncError::InvalidFilename(format!(
            "filename must not contain path separators: {:?}",
            name
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(SyncError::InvalidFilename(format!(
            "filename must not contain control characters: {:?}",
            name
        )));
    }
    Ok(name)
}

/// The server's content directory
#[derive(Debug, Clone)]
pub struct ContentDir {
    root: PathBuf,
    staging: PathBuf,
}

impl ContentDir {
    /// Open the content directory, creating it and its staging area if absent
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        std::fs::create_dir_all(&staging)?;
        Ok(Self { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final on-disk path for a validated name
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_filename(name)?))
    }

    /// Start writing an upload for `name` into the staging area
    pub async fn begin(&self, name: &str) -> Result<StagedFile> {
        let final_path = self.path_of(name)?;
        let temp_path = self.staging.join(format!("{}.part", Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(|e| SyncError::Storage(format!("cannot create staging file for {}: {}", name, e)))?;

        Ok(StagedFile {
            file,
            name: name.to_string(),
            temp_path,
            final_path,
            written: 0,
            committed: false,
        })
    }

    /// Open a stored file for reading. Returns the handle and its length.
    ///
    /// The length is taken from the open handle, so it stays consistent with the
    /// bytes read even if an overwrite renames a new file onto `name` meanwhile.
    pub async fn open(&self, name: &str) -> Result<(File, u64)> {
        let path = self.path_of(name)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::NotFound(name.to_string()));
            }
            Err(e) => return Err(SyncError::Io(e)),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(SyncError::NotFound(name.to_string()));
        }
        Ok((file, metadata.len()))
    }
}

/// An upload being written to the staging area.
///
/// Dropping it without `commit` removes the staging file.
pub struct StagedFile {
    file: File,
    name: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    committed: bool,
}

impl StagedFile {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| SyncError::Storage(format!("failed writing {}: {}", self.name, e)))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, sync and atomically move the file onto its final name,
    /// replacing any earlier file of the same name. Returns the byte count.
    pub async fn commit(mut self) -> Result<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| SyncError::Storage(format!("failed flushing {}: {}", self.name, e)))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| SyncError::Storage(format!("failed syncing {}: {}", self.name, e)))?;
        fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| SyncError::Storage(format!("failed storing {}: {}", self.name, e)))?;
        self.committed = true;
        Ok(self.written)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                log::debug!(
                    "could not remove staging file {}: {}",
                    self.temp_path.display(),
                    e
                );
            }
        }
    }
}
