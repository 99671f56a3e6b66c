//! HTTP server implementation.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::service::router;
use super::GateState;
use crate::error::{Result, TurnstileError};

/// HTTP server for the decision service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared limiter state
    state: GateState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: GateState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state).layer(TraceLayer::new_for_http());
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for rate limit decisions");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Io(e)
        })
    }
}
