//! Datastore coordination domain types
//!
//! This module defines the three records shared by every API instance through
//! the backing store: datastores (cache partitions), instances (replica
//! holders) and write locks (fenced leases).

use chrono::{DateTime, Utc};
use common::{deadline_after, StoreId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{DatastoreError, DatastoreResult};

/// A named logical cache partition scoped to one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    /// Owning store
    pub store_id: StoreId,
    /// Partition name, unique within the store
    pub name: String,
    /// Replicas should reload their copy
    pub reload: bool,
    /// When the reload was last requested
    pub reload_requested_at: Option<DateTime<Utc>>,
    /// First registration time
    pub created_at: DateTime<Utc>,
}

impl Datastore {
    /// Create a new datastore record
    pub fn new(store_id: StoreId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            store_id,
            name: name.into(),
            reload: false,
            reload_requested_at: None,
            created_at: now,
        }
    }
}

/// One running process holding a replica of a datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name, unique within the datastore
    pub name: String,
    /// Datastore the replica belongs to
    pub datastore_name: String,
    /// Owning store
    pub store_id: StoreId,
    /// First registration time; preserved by later heartbeats
    pub registered_at: DateTime<Utc>,
    /// Last heartbeat
    pub last_seen: DateTime<Utc>,
}

impl Instance {
    /// Create an instance seen for the first time at `now`
    pub fn new(
        name: impl Into<String>,
        datastore_name: impl Into<String>,
        store_id: StoreId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            datastore_name: datastore_name.into(),
            store_id,
            registered_at: now,
            last_seen: now,
        }
    }

    /// Whether the last heartbeat is within `threshold` of `now`
    pub fn is_live(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now <= deadline_after(self.last_seen, threshold)
    }
}

/// Identifies a grant of the write lock
///
/// Tokens only ever grow. Zero means the lock has never been granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FencingToken(u64);

impl FencingToken {
    /// Token of a lock that was never granted
    pub const INITIAL: FencingToken = FencingToken(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Token for the next grant
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a write lock: one per (store, datastore)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    pub store_id: StoreId,
    pub datastore_name: String,
}

impl LockKey {
    pub fn new(store_id: StoreId, datastore_name: impl Into<String>) -> Self {
        Self {
            store_id,
            datastore_name: datastore_name.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.datastore_name)
    }
}

/// Exclusive write permission for a datastore
///
/// Rows are created unheld with token 0 on the first acquisition attempt and
/// never deleted. Every mutation after creation goes through a
/// compare-and-swap against the previously read row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteLock {
    pub store_id: StoreId,
    pub datastore_name: String,
    /// Current (possibly expired) holder
    pub holder: Option<String>,
    /// Token of the latest grant
    pub fencing_token: FencingToken,
    pub acquired_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Lease length of the latest grant; renewals extend by the same amount
    #[serde(default)]
    pub lease_millis: Option<u64>,
}

impl WriteLock {
    /// A lock that has never been granted
    pub fn unheld(key: &LockKey) -> Self {
        Self {
            store_id: key.store_id,
            datastore_name: key.datastore_name.clone(),
            holder: None,
            fencing_token: FencingToken::INITIAL,
            acquired_at: None,
            lease_expires_at: None,
            lease_millis: None,
        }
    }

    /// Lease length the current grant was made with
    pub fn granted_lease(&self) -> Option<Duration> {
        self.lease_millis.map(Duration::from_millis)
    }

    pub fn key(&self) -> LockKey {
        LockKey::new(self.store_id, self.datastore_name.clone())
    }

    /// Strictly past the lease deadline. A lock without a deadline counts as
    /// expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lease_expires_at {
            Some(deadline) => now > deadline,
            None => true,
        }
    }

    /// Recorded holder matches `instance`, regardless of expiry
    pub fn is_held_by(&self, instance: &str) -> bool {
        self.holder.as_deref() == Some(instance)
    }

    /// Whether `instance` may be granted the lock at `now`
    pub fn is_grantable_to(&self, instance: &str, now: DateTime<Utc>) -> bool {
        self.holder.is_none() || self.is_held_by(instance) || self.is_expired(now)
    }

    /// The row after a successful acquisition: a new grant with the next token
    pub fn granted_to(&self, instance: &str, now: DateTime<Utc>, lease: Duration) -> Self {
        Self {
            holder: Some(instance.to_string()),
            fencing_token: self.fencing_token.next(),
            acquired_at: Some(now),
            lease_expires_at: Some(deadline_after(now, lease)),
            lease_millis: Some(u64::try_from(lease.as_millis()).unwrap_or(u64::MAX)),
            ..self.clone()
        }
    }

    /// The row after a renewal: same grant, later deadline
    pub fn extended(&self, now: DateTime<Utc>, lease: Duration) -> Self {
        Self {
            lease_expires_at: Some(deadline_after(now, lease)),
            ..self.clone()
        }
    }

    /// The row after a release. The token is kept.
    pub fn released(&self, now: DateTime<Utc>) -> Self {
        Self {
            holder: None,
            lease_expires_at: Some(now),
            ..self.clone()
        }
    }

    /// Error to report when `is_grantable_to` fails
    pub fn held_error(&self) -> DatastoreError {
        DatastoreError::LockHeld {
            holder: self.holder.clone(),
            expires_at: self.lease_expires_at,
        }
    }

    /// Interpret the row at `now`
    pub fn state(&self, now: DateTime<Utc>) -> LockState {
        match &self.holder {
            Some(holder) if !self.is_expired(now) => LockState::Held {
                holder: holder.clone(),
                token: self.fencing_token,
                expires_at: self.lease_expires_at.unwrap_or(now),
            },
            _ => LockState::Unheld {
                token: self.fencing_token,
            },
        }
    }
}

/// Read-only view of a lock row as returned by lookups
pub type LockSnapshot = WriteLock;

/// Lease state of a lock at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    /// Nobody may be writing; `token` is the last grant
    Unheld { token: FencingToken },
    /// `holder` owns the lease until `expires_at`
    Held {
        holder: String,
        token: FencingToken,
        expires_at: DateTime<Utc>,
    },
}

impl LockState {
    pub fn token(&self) -> FencingToken {
        match self {
            LockState::Unheld { token } | LockState::Held { token, .. } => *token,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, LockState::Held { .. })
    }
}

/// Result of a successful acquire or renew
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockGrant {
    pub store_id: StoreId,
    pub datastore_name: String,
    pub instance_name: String,
    /// Token to attach to the write about to be performed
    pub fencing_token: FencingToken,
    pub acquired_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
}

impl LockGrant {
    pub(crate) fn from_lock(lock: &WriteLock, instance: &str, now: DateTime<Utc>) -> Self {
        Self {
            store_id: lock.store_id,
            datastore_name: lock.datastore_name.clone(),
            instance_name: instance.to_string(),
            fencing_token: lock.fencing_token,
            acquired_at: lock.acquired_at.unwrap_or(now),
            lease_expires_at: lock.lease_expires_at.unwrap_or(now),
        }
    }
}

/// Reject empty store ids and blank names before touching the backing store
pub(crate) fn validate_identity(store_id: StoreId, names: &[(&str, &str)]) -> DatastoreResult<()> {
    if !store_id.is_valid() {
        return Err(DatastoreError::invalid_argument(format!(
            "store id must be positive, got {}",
            store_id
        )));
    }

    for (field, value) in names {
        if value.trim().is_empty() {
            return Err(DatastoreError::invalid_argument(format!(
                "{} must not be empty",
                field
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::{Clock, SystemClock};

    fn key() -> LockKey {
        LockKey::new(StoreId::new(1), "catalog")
    }

    #[test]
    fn test_unheld_lock_is_grantable_to_anyone() {
        let now = SystemClock.now();
        let lock = WriteLock::unheld(&key());

        assert!(lock.is_grantable_to("api-1", now));
        assert!(lock.is_expired(now));
        assert_eq!(lock.state(now), LockState::Unheld { token: FencingToken::INITIAL });
    }

    #[test]
    fn test_grant_increments_token_and_blocks_others() {
        let now = SystemClock.now();
        let lock = WriteLock::unheld(&key()).granted_to("api-1", now, Duration::from_secs(30));

        assert_eq!(lock.fencing_token, FencingToken::new(1));
        assert!(lock.is_grantable_to("api-1", now));
        assert!(!lock.is_grantable_to("api-2", now));
        assert_eq!(lock.lease_expires_at, Some(now + ChronoDuration::seconds(30)));
        assert_eq!(lock.granted_lease(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = SystemClock.now();
        let lock = WriteLock::unheld(&key()).granted_to("api-1", now, Duration::from_secs(30));
        let deadline = now + ChronoDuration::seconds(30);

        assert!(!lock.is_expired(deadline));
        assert!(!lock.is_grantable_to("api-2", deadline));
        assert!(lock.is_expired(deadline + ChronoDuration::microseconds(1)));
        assert!(lock.is_grantable_to("api-2", deadline + ChronoDuration::microseconds(1)));
    }

    #[test]
    fn test_extend_keeps_token_and_release_keeps_token() {
        let now = SystemClock.now();
        let lock = WriteLock::unheld(&key()).granted_to("api-1", now, Duration::from_secs(30));

        let later = now + ChronoDuration::seconds(10);
        let extended = lock.extended(later, Duration::from_secs(30));
        assert_eq!(extended.fencing_token, lock.fencing_token);
        assert_eq!(extended.acquired_at, lock.acquired_at);
        assert_eq!(extended.lease_expires_at, Some(later + ChronoDuration::seconds(30)));

        let released = extended.released(later);
        assert_eq!(released.holder, None);
        assert_eq!(released.fencing_token, FencingToken::new(1));
        assert_eq!(released.state(later), LockState::Unheld { token: FencingToken::new(1) });
    }

    #[test]
    fn test_expired_holder_reads_as_unheld() {
        let now = SystemClock.now();
        let lock = WriteLock::unheld(&key()).granted_to("api-1", now, Duration::from_secs(1));

        assert!(lock.state(now).is_held());
        let state = lock.state(now + ChronoDuration::seconds(2));
        assert!(!state.is_held());
        assert_eq!(state.token(), FencingToken::new(1));
    }

    #[test]
    fn test_instance_liveness() {
        let now = SystemClock.now();
        let instance = Instance::new("api-1", "catalog", StoreId::new(1), now);

        assert!(instance.is_live(now + ChronoDuration::seconds(90), Duration::from_secs(90)));
        assert!(!instance.is_live(now + ChronoDuration::seconds(91), Duration::from_secs(90)));
    }

    #[test]
    fn test_validate_identity() {
        assert!(validate_identity(StoreId::new(1), &[("name", "catalog")]).is_ok());
        assert!(validate_identity(StoreId::new(0), &[("name", "catalog")]).is_err());
        assert!(validate_identity(StoreId::new(1), &[("name", "  ")]).is_err());
    }
}
