pub mod config;
pub mod error;
pub mod store;
pub mod server;
pub mod client;
pub mod watch;

pub use config::Config;
pub use error::{Result, SyncError};
pub use client::{DiscoveryClient, Poller, UploadClient, UploadOutcome};
pub use server::{ServerHandle, SyncServer};
pub use store::{ContentDir, RecencyStore};
pub use watch::{DirectoryWatcher, SessionManager, WatchSession};
