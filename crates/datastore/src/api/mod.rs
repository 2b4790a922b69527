//! HTTP API for datastore coordination.
//!
//! ## Modules
//!
//! - `handlers` - HTTP handlers and error mapping
//! - `routes` - Axum router
//! - `models` - Request/response types

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::{error_response, DatastoreApiState};
pub use routes::datastore_routes;
