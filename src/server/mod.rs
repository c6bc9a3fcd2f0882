//! File-ingestion server: upload, recency discovery and download over HTTP.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{Result, SyncError};
use crate::store::{ContentDir, RecencyStore};

use handlers::{handle_check_new_files, handle_download, handle_health, handle_upload};

/// State shared by every handler. Both stores are injected, never global.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentDir>,
    pub recency: Arc<RecencyStore>,
}

impl AppState {
    pub fn new(content: ContentDir, recency: RecencyStore) -> Self {
        Self {
            content: Arc::new(content),
            recency: Arc::new(recency),
        }
    }
}

/// Build the HTTP router
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload/", post(handle_upload))
        .route("/upload", post(handle_upload))
        .route("/check_new_files/:since_timestamp", get(handle_check_new_files))
        .route("/download/:filename", get(handle_download))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// A bound, not yet serving, ingestion server
pub struct SyncServer {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl SyncServer {
    /// Create the content directory and bind the listening socket.
    ///
    /// Port 0 binds an ephemeral port; see `local_addr`.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let content = ContentDir::create(&config.content_dir)?;
        log::info!("Content directory: {}", content.root().display());

        let state = AppState::new(content, RecencyStore::new());
        let router = create_router(state.clone(), config.max_upload_bytes);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            let error_msg = if e.kind() == std::io::ErrorKind::AddrInUse {
                format!(
                    "Port {} is already in use. Stop the other process or set server.port in config.toml",
                    config.port
                )
            } else {
                format!("Failed to bind to {}: {}", addr, e)
            };
            SyncError::Io(std::io::Error::new(e.kind(), error_msg))
        })?;

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve in the foreground until the process exits
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        log::info!("Starting pixelsync server on http://{}", addr);

        axum::serve(self.listener, self.router)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))?;

        Ok(())
    }

    /// Serve on a background task that can be shut down deterministically
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        log::info!("Starting pixelsync server on http://{}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(self.listener, self.router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))
        });

        Ok(ServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a server started with `SyncServer::spawn`
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients on this machine should use
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.addr.port())
    }

    /// Stop accepting connections and wait for the serving task to finish
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let result = (&mut self.task)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("server task join: {}", e))))?;
        log::info!("Server on {} stopped", self.addr);
        result
    }
}
