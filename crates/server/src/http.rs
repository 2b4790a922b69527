//! HTTP listener built on Axum
//!
//! Every request is traced and counted in the `http_*` metrics, labelled by
//! the server name.

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use observability::{RequestMetricsGuard, ServerMetrics};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

#[derive(Clone)]
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
}

impl HttpServer {
    /// Wrap `router` with request tracing and request metrics
    pub fn new(name: impl Into<String>, config: ServerConfig, router: Router) -> Self {
        let metrics = Arc::new(ServerMetrics::new(name));
        let router = router
            .layer(middleware::from_fn_with_state(metrics, track_request))
            .layer(TraceLayer::new_for_http());

        Self { config, router }
    }


    /// The layered router, for in-process requests
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.config.address();
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { address, source })
    }

    /// Serve on `listener` until `shutdown` fires and open requests finish
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        if let Ok(local_addr) = listener.local_addr() {
            info!(%local_addr, "HTTP server listening");
        }

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(ServerError::Serve)?;

        info!("HTTP server stopped accepting connections");
        Ok(())
    }
}

async fn track_request(
    State(metrics): State<Arc<ServerMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let mut guard = RequestMetricsGuard::new(&metrics);
    let response = next.run(request).await;
    guard.set_status(response.status().as_u16());
    response
}
