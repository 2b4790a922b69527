//! Common types and utilities for Storefront
//!
//! This crate provides the identity types and time source shared by the
//! coordination, configuration and server crates.
//!
//! # Modules
//!
//! - [`types`] - Tenant identity (`StoreId`)
//! - [`time`] - Wall-clock abstraction used for lease expiry

pub mod time;
pub mod types;

pub use time::{deadline_after, Clock, ManualClock, SystemClock};
pub use types::StoreId;
