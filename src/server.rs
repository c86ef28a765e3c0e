//! HTTP server for the blob gateway.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::{AzureBackend, BackendError, BlobBackend, MemoryBackend};
use crate::config::{BackendKind, Config};
use crate::router::{create_router, AppState};

/// Blob gateway server.
pub struct GatewayServer {
    config: Arc<Config>,
    backend: Arc<dyn BlobBackend>,
}

impl GatewayServer {
    /// Creates a server with the backend selected by `config.backend`.
    pub fn new(config: Config) -> Result<Self, BackendError> {
        let backend: Arc<dyn BlobBackend> = match config.backend {
            BackendKind::Azure => Arc::new(AzureBackend::new(&config.account, config.request_timeout)?),
            BackendKind::Memory => Arc::new(MemoryBackend::new(&config.account)?),
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Creates a server over a caller-provided backend.
    pub fn with_backend(config: Config, backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    /// The router with its middleware stack.
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            config: self.config.clone(),
            backend: self.backend.clone(),
        };

        create_router(state).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any)
                        .expose_headers(Any),
                ),
        )
    }

    /// Binds the configured address and serves until Ctrl+C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.config.bind_address().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Blob gateway is listening at http://{}", addr);
        info!(
            backend = ?self.config.backend,
            account = %self.config.account.name,
            endpoint = %self.config.account.blob_endpoint,
            "storage backend configured"
        );

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> String {
        self.config.bind_address()
    }

    /// Returns the base URL of the gateway.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address())
    }
}

/// Builder for creating a gateway server.
pub struct GatewayServerBuilder {
    config: Config,
    backend: Option<Arc<dyn BlobBackend>>,
}

impl GatewayServerBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            backend: None,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Controls whether server-side error messages reach clients.
    pub fn display_error_details(mut self, display: bool) -> Self {
        self.config.display_error_details = display;
        self
    }

    /// Sets the request body limit.
    pub fn max_upload_bytes(mut self, limit: usize) -> Self {
        self.config.max_upload_bytes = limit;
        self
    }

    /// Uses the given backend instead of building one from the configuration.
    pub fn backend(mut self, backend: Arc<dyn BlobBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Builds the server.
    pub fn build(self) -> Result<GatewayServer, BackendError> {
        match self.backend {
            Some(backend) => Ok(GatewayServer::with_backend(self.config, backend)),
            None => GatewayServer::new(self.config),
        }
    }
}

impl Default for GatewayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
