//! Health check endpoints
//!
//! Every request runs the registered dependency checks afresh. A failing
//! check turns the response into a 503 so load balancers stop routing to an
//! instance whose backing store is unreachable.

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A dependency that can be checked on demand
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name reported in the `dependencies` list
    fn name(&self) -> &str;

    /// Where the dependency lives, for display only
    fn address(&self) -> String {
        String::new()
    }

    /// Succeeds when the dependency answers
    async fn check(&self) -> std::result::Result<(), String>;
}

/// Outcome of one dependency check
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub address: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `/health` and `/health/detailed`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<DependencyStatus>>,
}

/// Shared state behind the health routes
pub struct HealthState {
    service_name: String,
    started: Instant,
    checks: Vec<Arc<dyn HealthCheck>>,
    check_timeout: Duration,
}

impl HealthState {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            started: Instant::now(),
            checks: Vec::new(),
            check_timeout: Duration::from_secs(5),
        }
    }

    /// Add a dependency checked on every health request
    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Run every check, bounding each by the check timeout
    pub async fn check_dependencies(&self) -> Vec<DependencyStatus> {
        let mut statuses = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let start = Instant::now();
            let outcome = match tokio::time::timeout(self.check_timeout, check.check()).await {
                Ok(result) => result,
                Err(_) => Err(format!("no answer within {:?}", self.check_timeout)),
            };

            statuses.push(DependencyStatus {
                name: check.name().to_string(),
                address: check.address(),
                healthy: outcome.is_ok(),
                latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                error: outcome.err(),
            });
        }
        statuses
    }

    async fn report(&self, detailed: bool) -> (StatusCode, Json<HealthReport>) {
        let dependencies = self.check_dependencies().await;
        let healthy = dependencies.iter().all(|d| d.healthy);
        let status_code = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        let report = HealthReport {
            status: if healthy { "ok" } else { "unavailable" },
            service: self.service_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            dependencies: detailed.then_some(dependencies),
        };

        (status_code, Json(report))
    }
}

pub async fn health_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<HealthReport>) {
    state.report(false).await
}

/// Like `/health`, plus the per-dependency results
pub async fn detailed_health_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<HealthReport>) {
    state.report(true).await
}

pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/detailed", get(detailed_health_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Switch {
        up: AtomicBool,
    }

    #[async_trait]
    impl HealthCheck for Switch {
        fn name(&self) -> &str {
            "coordination-store"
        }

        async fn check(&self) -> std::result::Result<(), String> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("connection refused".to_string())
            }
        }
    }

    struct Hung;

    #[async_trait]
    impl HealthCheck for Hung {
        fn name(&self) -> &str {
            "hung"
        }

        async fn check(&self) -> std::result::Result<(), String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_no_checks_is_healthy() {
        let state = Arc::new(HealthState::new("test-service"));
        assert_eq!(state.service_name(), "test-service");

        let (status, Json(report)) = health_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ok");
        assert!(report.dependencies.is_none());
    }

    #[tokio::test]
    async fn test_check_outcome_drives_status() {
        let switch = Arc::new(Switch {
            up: AtomicBool::new(true),
        });
        let state = Arc::new(HealthState::new("storefront").with_check(switch.clone()));

        let (status, _) = health_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);

        switch.up.store(false, Ordering::SeqCst);
        let (status, Json(report)) = detailed_health_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "unavailable");
        let dependencies = report.dependencies.unwrap();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].error.as_deref(), Some("connection refused"));

        // Each request checks afresh
        switch.up.store(true, Ordering::SeqCst);
        let (status, _) = health_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_hung_check_times_out() {
        let state = HealthState::new("storefront")
            .with_check(Arc::new(Hung))
            .with_check_timeout(Duration::from_millis(20));

        let statuses = state.check_dependencies().await;
        assert!(!statuses[0].healthy);
        assert!(statuses[0].error.as_deref().unwrap().starts_with("no answer within"));
    }
}
