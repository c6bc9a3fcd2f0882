//! Watcher thread: notify events in, one "file created" callback per new file out.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{Result, SyncError};

/// Called on the watcher thread for every regular file created in the watched directory
pub trait FileCreatedHandler: Send + 'static {
    fn on_file_created(&self, path: &Path);
}

impl<F> FileCreatedHandler for F
where
    F: Fn(&Path) + Send + 'static,
{
    fn on_file_created(&self, path: &Path) {
        self(path)
    }
}

enum WatchMessage {
    Fs(notify::Result<Event>),
    Stop,
}

/// Feeds synthetic filesystem events into a detached watcher
#[derive(Clone)]
pub struct EventInjector {
    tx: mpsc::Sender<WatchMessage>,
}

impl EventInjector {
    /// Returns false once the watcher has stopped
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(WatchMessage::Fs(Ok(event))).is_ok()
    }
}

/// Non-recursive watch over one directory with a dedicated dispatch thread.
///
/// `stop` (also run on drop) returns only after the dispatch thread has exited,
/// so no callback runs after it returns.
pub struct DirectoryWatcher {
    root: PathBuf,
    tx: mpsc::Sender<WatchMessage>,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    backend: Option<RecommendedWatcher>,
}

impl DirectoryWatcher {
    /// Watch `root` through the platform's native notification backend
    pub fn start<H: FileCreatedHandler>(root: &Path, handler: H) -> Result<Self> {
        if !root.is_dir() {
            return Err(SyncError::Watch(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let (tx, rx) = mpsc::channel();
        let event_tx = tx.clone();
        let mut backend = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(WatchMessage::Fs(res));
        })?;
        backend.watch(root, RecursiveMode::NonRecursive)?;

        let mut watcher = Self::spawn(root, tx, rx, handler)?;
        watcher.backend = Some(backend);
        Ok(watcher)
    }

    /// Dispatch thread only, no OS watch; events come from the returned injector
    pub fn detached<H: FileCreatedHandler>(root: &Path, handler: H) -> Result<(Self, EventInjector)> {
        let (tx, rx) = mpsc::channel();
        let injector = EventInjector { tx: tx.clone() };
        let watcher = Self::spawn(root, tx, rx, handler)?;
        Ok((watcher, injector))
    }

    fn spawn<H: FileCreatedHandler>(
        root: &Path,
        tx: mpsc::Sender<WatchMessage>,
        rx: mpsc::Receiver<WatchMessage>,
        handler: H,
    ) -> Result<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let thread_stopping = Arc::clone(&stopping);
        let thread_root = root.to_path_buf();

        let worker = std::thread::Builder::new()
            .name("pixelsync-watch".to_string())
            .spawn(move || dispatch_loop(&thread_root, rx, &thread_stopping, handler))?;

        Ok(Self {
            root: root.to_path_buf(),
            tx,
            stopping,
            worker: Some(worker),
            backend: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop watching and wait for the dispatch thread to exit.
    /// Events still queued are discarded. Idempotent.
    pub fn stop(&mut self) {
        // Release the OS watch first so nothing new gets queued
        self.backend.take();

        if let Some(worker) = self.worker.take() {
            self.stopping.store(true, Ordering::SeqCst);
            let _ = self.tx.send(WatchMessage::Stop);
            if worker.join().is_err() {
                log::error!("watcher thread for {} panicked", self.root.display());
            }
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop<H: FileCreatedHandler>(
    root: &Path,
    rx: mpsc::Receiver<WatchMessage>,
    stopping: &AtomicBool,
    handler: H,
) {
    while let Ok(message) = rx.recv() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        match message {
            WatchMessage::Stop => break,
            WatchMessage::Fs(Ok(event)) => {
                for path in created_files(&event) {
                    log::debug!("created: {}", path.display());
                    handler.on_file_created(&path);
                }
            }
            WatchMessage::Fs(Err(e)) => {
                log::warn!("watch error on {}: {}", root.display(), e);
            }
        }
    }
    log::debug!("watcher for {} exited", root.display());
}

/// Regular files created by `event`.
///
/// A `File` create is trusted even if the file is already gone, so the upload
/// reports the failure. Backends that cannot tell files from folders are checked on disk.
fn created_files(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File) => event.paths.clone(),
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths.iter().filter(|p| p.is_file()).cloned().collect(),
        _ => Vec::new(),
    }
}
