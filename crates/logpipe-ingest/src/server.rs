//! Ingest server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::retention::RetentionSweeper;
use crate::routes::create_router;
use crate::state::IngestState;

/// HTTP server receiving, serving and streaming log events.
#[derive(Debug, Clone)]
pub struct IngestServer {
    state: Arc<IngestState>,
}

impl IngestServer {
    /// Create a server over existing state.
    #[must_use]
    pub const fn new(state: Arc<IngestState>) -> Self {
        Self { state }
    }

    /// Create a server backed by a filesystem archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be opened.
    pub fn open(config: IngestConfig) -> IngestResult<Self> {
        Ok(Self::new(Arc::new(IngestState::open(config)?)))
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<IngestState> {
        Arc::clone(&self.state)
    }

    /// A retention sweeper for this server's archive and settings.
    #[must_use]
    pub fn sweeper(&self) -> RetentionSweeper {
        let retention = self.state.config().retention;
        RetentionSweeper::new(
            self.state.archive(),
            retention.policy(),
            retention.sweep_interval(),
        )
    }

    /// Bind to `addr` and serve until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops abnormally.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> IngestResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IngestError::BindFailed(addr, e))?;

        self.serve_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    ///
    /// In-flight requests finish before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops abnormally.
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> IngestResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| IngestError::Internal(e.to_string()))?;
        info!(addr = %addr, "ingest server listening");

        let router = create_router(Arc::clone(&self.state));

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| IngestError::Internal(e.to_string()))?;

        info!("ingest server shut down");
        Ok(())
    }
}
