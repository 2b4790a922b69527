//! Shared domain types for Storefront
//!
//! Every coordination record is scoped to a tenant store. The store id is
//! supplied by callers and never allocated here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant store identifier
///
/// Store ids are positive integers; zero and negative values are treated as
/// "empty" and rejected by the registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(i64);

impl StoreId {
    /// Wrap a raw store id without validating it
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value, as stored in the backing database
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this id can identify a store
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl From<i64> for StoreId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
