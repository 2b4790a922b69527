//! Datastore coordination error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::FencingToken;

/// Errors that can occur while registering datastores and instances or
/// negotiating write leases
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatastoreError {
    /// Malformed identity (empty name, non-positive store id)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced datastore or instance does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another instance holds an unexpired lease, or the caller is not the
    /// holder it claims to be
    #[error("Write lock held by {}", describe_holder(.holder, .expires_at))]
    LockHeld {
        holder: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Compare-and-swap kept losing races against other writers
    #[error("Write lock contended: gave up after {attempts} attempts")]
    LockContended { attempts: u32 },

    /// A write carried a fencing token that is no longer current
    #[error("Stale fencing token {presented}, current token is {current}")]
    StaleToken {
        presented: FencingToken,
        current: FencingToken,
    },

    /// Backing store unreachable
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// Backing store rejected or failed a statement
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatastoreError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Conditions a caller is expected to back off from and try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockHeld { .. } | Self::LockContended { .. } | Self::Unavailable(_)
        )
    }

    /// Configuration mistakes on the caller's side; retrying will not help
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::NotFound(_))
    }

    /// Whether the write should be answered with "resource busy, retry"
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::LockHeld { .. } | Self::LockContended { .. })
    }
}

fn describe_holder(holder: &Option<String>, expires_at: &Option<DateTime<Utc>>) -> String {
    let holder = holder.as_deref().unwrap_or("no instance");
    match expires_at {
        Some(at) => format!("{} until {}", holder, at.to_rfc3339()),
        None => holder.to_string(),
    }
}

/// Result type for datastore coordination operations
pub type DatastoreResult<T> = std::result::Result<T, DatastoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let held = DatastoreError::LockHeld {
            holder: Some("api-2".to_string()),
            expires_at: None,
        };
        assert!(held.is_retryable());
        assert!(held.is_busy());
        assert!(!held.is_caller_error());

        let contended = DatastoreError::LockContended { attempts: 5 };
        assert!(contended.is_busy());

        let missing = DatastoreError::not_found("datastore catalog");
        assert!(missing.is_caller_error());
        assert!(!missing.is_retryable());

        assert!(DatastoreError::Unavailable("refused".into()).is_retryable());
        assert!(!DatastoreError::Storage("syntax".into()).is_retryable());
    }

    #[test]
    fn test_lock_held_message() {
        let err = DatastoreError::LockHeld {
            holder: Some("api-2".to_string()),
            expires_at: None,
        };
        assert_eq!(err.to_string(), "Write lock held by api-2");

        let err = DatastoreError::LockHeld {
            holder: None,
            expires_at: None,
        };
        assert_eq!(err.to_string(), "Write lock held by no instance");
    }
}
