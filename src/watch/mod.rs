//! Watch sessions: one directory, one upload target, one directory watcher.
//!
//! The watcher thread only hands each created file to the async runtime; the
//! upload itself runs as a task there, so several uploads can be in flight at once
//! and neither side blocks the other.

mod watcher;

pub use watcher::{DirectoryWatcher, EventInjector, FileCreatedHandler};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::runtime::Handle;
use url::Url;

use crate::client::UploadClient;
use crate::error::{Result, SyncError};

/// Handler that uploads every created file on `runtime`, after waiting `settle`
/// for the writer to finish.
pub fn upload_handler(
    client: UploadClient,
    runtime: Handle,
    settle: Duration,
) -> impl FileCreatedHandler {
    move |path: &Path| {
        let client = client.clone();
        let path = path.to_path_buf();
        runtime.spawn(async move {
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            client.upload(&path).await;
        });
    }
}

/// A directory bound to an upload target, active until stopped
pub struct WatchSession {
    dir: PathBuf,
    target: Url,
    watcher: DirectoryWatcher,
}

impl WatchSession {
    pub fn start(dir: &Path, client: UploadClient, runtime: Handle, settle: Duration) -> Result<Self> {
        let target = client.server_url().clone();
        let watcher = DirectoryWatcher::start(dir, upload_handler(client, runtime, settle))?;
        log::info!("Now watching folder: {} (uploading to {})", dir.display(), target);
        Ok(Self {
            dir: dir.to_path_buf(),
            target,
            watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Stop and join the watcher. Uploads already handed to the runtime still finish.
    pub fn stop(mut self) {
        self.watcher.stop();
        log::info!("Stopped watching folder: {}", self.dir.display());
    }
}

/// Holds at most one watch session; selecting a folder replaces it.
pub struct SessionManager {
    client: UploadClient,
    runtime: Handle,
    settle: Duration,
    current: Option<WatchSession>,
}

impl SessionManager {
    pub fn new(client: UploadClient, runtime: Handle, settle: Duration) -> Self {
        Self {
            client,
            runtime,
            settle,
            current: None,
        }
    }

    /// Watch `dir` instead of the current folder.
    ///
    /// The old session is fully stopped before the new one starts. If the new
    /// one fails to start, no session is active.
    ///
    /// Stopping joins the old watcher thread, which blocks the caller. From async
    /// code use [`SessionManager::switch_folder`].
    pub fn select_folder(&mut self, dir: &Path) -> Result<()> {
        self.stop();
        let session = WatchSession::start(dir, self.client.clone(), self.runtime.clone(), self.settle)?;
        self.current = Some(session);
        Ok(())
    }

    /// `select_folder` for async callers: the old session is joined on the
    /// blocking pool instead of a runtime worker.
    pub async fn switch_folder(&mut self, dir: &Path) -> Result<()> {
        if let Some(old) = self.current.take() {
            tokio::task::spawn_blocking(move || old.stop())
                .await
                .map_err(|e| SyncError::Watch(format!("stopping previous session failed: {}", e)))?;
        }
        self.select_folder(dir)
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.dir())
    }

    pub fn stop(&mut self) {
        if let Some(session) = self.current.take() {
            session.stop();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
