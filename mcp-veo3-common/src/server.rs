//! MCP server runner.
//!
//! Wraps an rmcp `ServerHandler` and serves it over the selected
//! [`Transport`] until the peer disconnects or a shutdown signal arrives.
//!
//! # Example
//!
//! ```ignore
//! use mcp_veo3_common::server::McpServerBuilder;
//! use mcp_veo3_common::transport::Transport;
//!
//! McpServerBuilder::new(handler)
//!     .with_transport(Transport::stdio())
//!     .run()
//!     .await?;
//! ```

use crate::transport::Transport;
use rmcp::{ServerHandler, ServiceExt};
use thiserror::Error;
use tokio::sync::oneshot;

/// Path the streamable HTTP service is mounted on.
pub const HTTP_MCP_PATH: &str = "/mcp";

/// Errors that can occur when running an MCP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified port
    #[error("Failed to bind to port {port}: {message}")]
    BindFailed { port: u16, message: String },

    /// Transport error during communication
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for configuring and running the MCP server.
pub struct McpServerBuilder<H> {
    handler: H,
    transport: Transport,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<H> McpServerBuilder<H>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    /// Create a new server builder with the given handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            transport: Transport::default(),
            shutdown_rx: None,
        }
    }

    /// Set the transport mode for the server.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Use `shutdown_rx` instead of process signals to stop the server.
    pub fn with_shutdown(mut self, shutdown_rx: oneshot::Receiver<()>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Serve until the transport closes or shutdown is requested.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(transport = %self.transport, "Starting MCP server");

        match self.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http { port } => self.run_http(port).await,
        }
    }

    async fn run_stdio(self) -> Result<(), ServerError> {
        use rmcp::transport::io::stdio;

        let shutdown = shutdown_future(self.shutdown_rx);

        let service = self
            .handler
            .serve(stdio())
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tokio::select! {
            result = service.waiting() => {
                result.map_err(|e| ServerError::Transport(e.to_string()))?;
                tracing::info!("Client disconnected");
                Ok(())
            }
            _ = shutdown => {
                tracing::info!("Received shutdown signal, stopping server");
                Ok(())
            }
        }
    }

    async fn run_http(self, port: u16) -> Result<(), ServerError> {
        use rmcp::transport::streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpService,
        };

        let handler = self.handler.clone();
        let service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        let router = axum::Router::new().nest_service(HTTP_MCP_PATH, service);

        let bind_addr = format!("0.0.0.0:{}", port);
        let tcp_listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                port,
                message: e.to_string(),
            })?;

        tracing::info!(port, path = HTTP_MCP_PATH, "HTTP server listening");

        axum::serve(tcp_listener, router)
            .with_graceful_shutdown(shutdown_future(self.shutdown_rx))
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_future(shutdown_rx: Option<oneshot::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => wait_for_shutdown_signal().await,
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to register signal handlers, falling back to Ctrl+C");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C; server will run until the transport closes");
            std::future::pending::<()>().await;
        }
    }
}

/// Create a channel for triggering shutdown programmatically.
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}
