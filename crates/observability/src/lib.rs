//! Observability infrastructure for Storefront
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//! - Metric sets for the HTTP server and the write-lock coordinator
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("storefront", LogFormat::Pretty)?;
//! observability::metrics::init_metrics(9100)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{
    init_metrics, AcquireOutcome, CoordinationMetrics, RequestMetricsGuard, ServerMetrics,
};

