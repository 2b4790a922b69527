//! Server infrastructure for Storefront
//!
//! This crate provides the HTTP listener, health endpoints and lifecycle
//! management shared by the Storefront binary.
//!
//! Shutdown coordination uses `CancellationToken` from `tokio_util`: the
//! [`ShutdownController`] owns the root token and every long-running task
//! takes a child.
//!
//! # Modules
//!
//! - [`config`] - Listener bind settings
//! - [`http`] - HTTP listener using Axum
//! - [`health`] - Health check endpoints and dependency checks
//! - [`port_validator`] - Startup port checks
//! - [`shutdown`] - Shutdown controller and reasons

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod port_validator;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use health::{health_routes, DependencyStatus, HealthCheck, HealthReport, HealthState};
pub use http::HttpServer;
pub use port_validator::validate_ports_available;
pub use shutdown::{ShutdownController, ShutdownReason};

/// The Storefront API server: an application router plus health endpoints
///
/// # Example
///
/// ```ignore
/// let health = Arc::new(HealthState::new("storefront").with_check(store_check));
/// let server = StorefrontServer::new("storefront", config, api_router, health);
/// server.run(shutdown.child_token()).await?;
/// ```
pub struct StorefrontServer {
    name: String,
    http: HttpServer,
    drain_timeout: Duration,
}

impl StorefrontServer {
    /// Serve `router` with `/health` and `/health/detailed` merged in
    pub fn new(
        name: impl Into<String>,
        config: ServerConfig,
        router: axum::Router,
        health: Arc<HealthState>,
    ) -> Self {
        let name = name.into();
        let router = router.merge(health_routes(health));
        Self {
            http: HttpServer::new(name.clone(), config, router),
            name,
            drain_timeout: Duration::from_secs(30),
        }
    }

    /// Bound how long in-flight requests may take to drain
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }


    /// Bind, then serve until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.http.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires
    ///
    /// After cancellation, open requests get the drain timeout to finish;
    /// past that the listener task is aborted and `DrainTimeout` returned.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!(server = %self.name, "Starting server");

        let http = self.http.clone();
        let token = shutdown.child_token();
        let mut handle = tokio::spawn(async move { http.serve(listener, token).await });

        let finished = tokio::select! {
            joined = &mut handle => Some(joined),
            _ = shutdown.cancelled() => None,
        };

        let joined = match finished {
            Some(joined) => joined,
            None => {
                info!(timeout = ?self.drain_timeout, "Draining in-flight requests");
                match tokio::time::timeout(self.drain_timeout, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        warn!(server = %self.name, "Requests still open after drain timeout");
                        return Err(ServerError::DrainTimeout(self.drain_timeout));
                    }
                }
            }
        };


        match joined {
            Ok(Ok(())) => {
                info!(server = %self.name, "Server shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "HTTP listener exited with error");
                Err(e)
            }
            Err(e) => Err(ServerError::ListenerPanicked(e.to_string())),
        }
    }
}
