//! Local-datastore write coordination for Storefront
//!
//! API instances keep private replicas of slow-changing, store-scoped data.
//! This crate tracks which datastores exist, which instances serve them, and
//! which instance may currently write the authoritative copy.
//!
//! # Features
//!
//! - Datastore registration and reload flags
//! - Instance registration, heartbeats and liveness
//! - Lease-based write locks with compare-and-swap and fencing tokens
//! - Replica-side token watching for invalidation
//!
//! # Feature Flags
//!
//! - `postgres` - Enable PostgreSQL backing store
//! - `api` - Enable HTTP API

pub mod types;
pub mod error;
pub mod store;
pub mod registry;
pub mod coordinator;
pub mod heartbeat;
pub mod manager;

#[cfg(feature = "api")]
pub mod api;

// Re-export commonly used types
pub use types::{
    Datastore, FencingToken, Instance, LockGrant, LockKey, LockSnapshot, LockState, WriteLock,
};

pub use error::{DatastoreError, DatastoreResult};
pub use registry::{DatastoreRegistry, InstanceRegistry};
pub use coordinator::{CoordinatorSettings, TokenWatch, WriteLockCoordinator};
pub use heartbeat::InstanceHeartbeat;
pub use manager::DatastoreManager;

// Store exports
pub use store::traits::CoordinationStore;
pub use store::memory::InMemoryCoordinationStore;

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresCoordinationStore;
