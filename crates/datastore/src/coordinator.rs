//! Write-lock coordinator
//!
//! Grants one exclusive, time-bounded write lease per (store, datastore) to
//! API instances that share nothing but the backing store.
//!
//! Every change to a lock row after its creation is a compare-and-swap keyed
//! on the holder, token and expiry that were just read. A lost race re-reads
//! the row and tries again, up to `max_cas_retries` attempts. Each successful
//! acquisition bumps the fencing token, so a writer whose lease lapsed can be
//! rejected at commit time by `check_fence`.
//!
//! Within one process, calls for the same key are serialized on a local
//! async mutex before any backing-store round trip. The mutex only lives
//! while calls for its key are in flight.

use common::{Clock, StoreId};
use observability::{AcquireOutcome, CoordinationMetrics};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{DatastoreError, DatastoreResult};
use crate::registry::datastores::missing_datastore;
use crate::store::traits::CoordinationStore;
use crate::types::{
    validate_identity, FencingToken, LockGrant, LockKey, LockSnapshot, LockState, WriteLock,
};

/// Lease and retry tuning
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Lease granted when the caller does not ask for one
    pub lease_duration: Duration,
    /// Compare-and-swap attempts before giving up with `LockContended`
    pub max_cas_retries: u32,
    /// Pause between compare-and-swap attempts
    pub cas_retry_backoff: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(30),
            max_cas_retries: 5,
            cas_retry_backoff: Duration::from_millis(20),
        }
    }
}

impl From<&config::CoordinationConfig> for CoordinatorSettings {
    fn from(config: &config::CoordinationConfig) -> Self {
        Self {
            lease_duration: config.lease_duration(),
            max_cas_retries: config.max_cas_retries,
            cas_retry_backoff: config.cas_retry_backoff(),
        }
    }
}

type LocalLock = Arc<tokio::sync::Mutex<()>>;

pub struct WriteLockCoordinator {
    store: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    local_locks: Mutex<HashMap<LockKey, LocalLock>>,
    metrics: CoordinationMetrics,
}

impl WriteLockCoordinator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            local_locks: Mutex::new(HashMap::new()),
            metrics: CoordinationMetrics::new(),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Acquire the write lease for `instance_name`
    ///
    /// Succeeds when the lock is unheld, already held by the caller, or held
    /// under an expired lease. Every success is a new grant with the next
    /// fencing token. A `None` lease uses the configured default.
    ///
    /// # Errors
    /// - `LockHeld` when another instance holds an unexpired lease
    /// - `LockContended` when every compare-and-swap attempt lost a race
    /// - `NotFound` when the datastore is not registered
    pub async fn acquire(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        instance_name: &str,
        lease: Option<Duration>,
    ) -> DatastoreResult<LockGrant> {
        let started = Instant::now();
        let result = self
            .try_acquire(store_id, datastore_name, instance_name, lease)
            .await;

        let outcome = match &result {
            Ok(_) => AcquireOutcome::Granted,
            Err(DatastoreError::LockHeld { .. }) => AcquireOutcome::Held,
            Err(DatastoreError::LockContended { .. }) => AcquireOutcome::Contended,
            Err(_) => AcquireOutcome::Failed,
        };
        self.metrics.record_acquire(outcome, started.elapsed());

        result
    }

    async fn try_acquire(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        instance_name: &str,
        lease: Option<Duration>,
    ) -> DatastoreResult<LockGrant> {
        validate_identity(
            store_id,
            &[("datastore name", datastore_name), ("instance name", instance_name)],
        )?;
        let lease = lease.unwrap_or(self.settings.lease_duration);
        if lease.is_zero() {
            return Err(DatastoreError::invalid_argument("lease duration must be positive"));
        }

        let key = LockKey::new(store_id, datastore_name);
        self.serialized(&key, self.acquire_locked(&key, instance_name, lease))
            .await
    }

    async fn acquire_locked(
        &self,
        key: &LockKey,
        instance_name: &str,
        lease: Duration,
    ) -> DatastoreResult<LockGrant> {
        let mut current = self.load_or_create(key).await?;
        for attempt in 1..=self.settings.max_cas_retries {
            let now = self.clock.now();
            if !current.is_grantable_to(instance_name, now) {
                debug!(
                    store_id = %key.store_id,
                    datastore = %key.datastore_name,
                    instance = instance_name,
                    holder = ?current.holder,
                    "Write lock held by another instance"
                );
                return Err(current.held_error());
            }

            let granted = current.granted_to(instance_name, now, lease);
            if self.store.compare_and_swap_lock(&current, &granted).await? {
                let reclaimed_from = current
                    .holder
                    .as_deref()
                    .filter(|holder| *holder != instance_name);
                if let Some(previous) = reclaimed_from {
                    self.metrics.reclaimed();
                    info!(
                        store_id = %key.store_id,
                        datastore = %key.datastore_name,
                        instance = instance_name,
                        previous,
                        token = %granted.fencing_token,
                        "Write lock reclaimed from expired holder"
                    );
                } else {
                    info!(
                        store_id = %key.store_id,
                        datastore = %key.datastore_name,
                        instance = instance_name,
                        token = %granted.fencing_token,
                        "Write lock granted"
                    );
                }
                return Ok(LockGrant::from_lock(&granted, instance_name, now));
            }

            current = self.after_conflict(key, attempt).await?;
        }

        warn!(
            store_id = %key.store_id,
            datastore = %key.datastore_name,
            instance = instance_name,
            attempts = self.settings.max_cas_retries,
            "Gave up acquiring write lock"
        );
        Err(DatastoreError::LockContended {
            attempts: self.settings.max_cas_retries,
        })
    }

    /// Extend the caller's lease, keeping its fencing token
    ///
    /// The new deadline is `now` plus the lease length the grant was made
    /// with; rows written before lease lengths were recorded fall back to the
    /// configured default. The caller must be the recorded holder. A holder
    /// whose lease lapsed may still renew as long as nobody else was granted
    /// the lock meanwhile.
    pub async fn renew(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        instance_name: &str,
    ) -> DatastoreResult<LockGrant> {
        validate_identity(
            store_id,
            &[("datastore name", datastore_name), ("instance name", instance_name)],
        )?;

        let key = LockKey::new(store_id, datastore_name);
        self.serialized(&key, self.renew_locked(&key, instance_name))
            .await
    }

    async fn renew_locked(&self, key: &LockKey, instance_name: &str) -> DatastoreResult<LockGrant> {
        let mut current = self.load_existing(key).await?;
        for attempt in 1..=self.settings.max_cas_retries {
            if !current.is_held_by(instance_name) {
                debug!(
                    store_id = %key.store_id,
                    datastore = %key.datastore_name,
                    instance = instance_name,
                    holder = ?current.holder,
                    "Renew refused: caller is not the holder"
                );
                return Err(current.held_error());
            }

            let now = self.clock.now();
            let lease = current
                .granted_lease()
                .unwrap_or(self.settings.lease_duration);
            let extended = current.extended(now, lease);
            if self.store.compare_and_swap_lock(&current, &extended).await? {
                self.metrics.renewed();
                debug!(
                    store_id = %key.store_id,
                    datastore = %key.datastore_name,
                    instance = instance_name,
                    token = %extended.fencing_token,
                    lease_ms = lease.as_millis() as u64,
                    "Write lock renewed"
                );
                return Ok(LockGrant::from_lock(&extended, instance_name, now));
            }

            current = self.after_conflict(key, attempt).await?;
        }

        Err(DatastoreError::LockContended {
            attempts: self.settings.max_cas_retries,
        })
    }

    /// Give up the lease
    ///
    /// # Returns
    /// `true` if the caller was the holder and the lock is now unheld, `false`
    /// if the caller did not hold it (nothing changes)
    pub async fn release(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        instance_name: &str,
    ) -> DatastoreResult<bool> {
        validate_identity(
            store_id,
            &[("datastore name", datastore_name), ("instance name", instance_name)],
        )?;

        let key = LockKey::new(store_id, datastore_name);
        self.serialized(&key, self.release_locked(&key, instance_name))
            .await
    }

    async fn release_locked(&self, key: &LockKey, instance_name: &str) -> DatastoreResult<bool> {
        let mut current = self.load_existing(key).await?;
        for attempt in 1..=self.settings.max_cas_retries {
            if !current.is_held_by(instance_name) {
                debug!(
                    store_id = %key.store_id,
                    datastore = %key.datastore_name,
                    instance = instance_name,
                    holder = ?current.holder,
                    "Release ignored: caller is not the holder"
                );
                return Ok(false);
            }

            let released = current.released(self.clock.now());
            if self.store.compare_and_swap_lock(&current, &released).await? {
                self.metrics.released();
                info!(
                    store_id = %key.store_id,
                    datastore = %key.datastore_name,
                    instance = instance_name,
                    token = %released.fencing_token,
                    "Write lock released"
                );
                return Ok(true);
            }

            current = self.after_conflict(key, attempt).await?;
        }

        Err(DatastoreError::LockContended {
            attempts: self.settings.max_cas_retries,
        })
    }

    /// Read the lock without creating it
    ///
    /// A never-acquired lock reads as unheld with token 0.
    pub async fn get(
        &self,
        store_id: StoreId,
        datastore_name: &str,
    ) -> DatastoreResult<LockSnapshot> {
        validate_identity(store_id, &[("datastore name", datastore_name)])?;

        let key = LockKey::new(store_id, datastore_name);
        match self.store.get_lock(&key).await? {
            Some(lock) => Ok(lock),
            None => {
                self.require_datastore(&key).await?;
                Ok(WriteLock::unheld(&key))
            }
        }
    }

    /// Lease state at the current instant; an expired holder reads as unheld
    pub async fn state(
        &self,
        store_id: StoreId,
        datastore_name: &str,
    ) -> DatastoreResult<LockState> {
        let snapshot = self.get(store_id, datastore_name).await?;
        Ok(snapshot.state(self.clock.now()))
    }

    /// Accept a write tagged with `token` only if no newer grant exists
    pub async fn check_fence(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        token: FencingToken,
    ) -> DatastoreResult<()> {
        let current = self.get(store_id, datastore_name).await?.fencing_token;
        if token == current {
            Ok(())
        } else {
            warn!(
                store_id = %store_id,
                datastore = datastore_name,
                presented = %token,
                current = %current,
                "Rejected write with stale fencing token"
            );
            Err(DatastoreError::StaleToken {
                presented: token,
                current,
            })
        }
    }

    /// Run `op` while holding the local mutex for `key`, then drop the mutex
    /// from the map if no other caller is waiting on it
    async fn serialized<T>(&self, key: &LockKey, op: impl Future<Output = T>) -> T {
        let local = self.local_lock(key);
        let result = {
            let _serialized = local.lock().await;
            op.await
        };
        drop(local);

        let mut locks = self.local_locks.lock();
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
        result
    }

    fn local_lock(&self, key: &LockKey) -> LocalLock {
        self.local_locks.lock().entry(key.clone()).or_default().clone()
    }

    async fn require_datastore(&self, key: &LockKey) -> DatastoreResult<()> {
        match self.store.get_datastore(key.store_id, &key.datastore_name).await? {
            Some(_) => Ok(()),
            None => Err(missing_datastore(key.store_id, &key.datastore_name)),
        }
    }

    /// Current row, inserting the initial unheld row on first use
    async fn load_or_create(&self, key: &LockKey) -> DatastoreResult<WriteLock> {
        if let Some(lock) = self.store.get_lock(key).await? {
            return Ok(lock);
        }
        self.require_datastore(key).await?;
        self.store.insert_lock_if_absent(WriteLock::unheld(key)).await
    }

    /// Current row, or the virtual unheld row when none was ever created
    async fn load_existing(&self, key: &LockKey) -> DatastoreResult<WriteLock> {
        match self.store.get_lock(key).await? {
            Some(lock) => Ok(lock),
            None => {
                self.require_datastore(key).await?;
                Ok(WriteLock::unheld(key))
            }
        }
    }

    /// Back off after a lost compare-and-swap, then re-read the row
    async fn after_conflict(&self, key: &LockKey, attempt: u32) -> DatastoreResult<WriteLock> {
        self.metrics.cas_conflict();
        debug!(
            store_id = %key.store_id,
            datastore = %key.datastore_name,
            attempt,
            "Write lock compare-and-swap lost a race"
        );

        let backoff = self.settings.cas_retry_backoff;
        if attempt < self.settings.max_cas_retries && !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }
        self.load_or_create(key).await
    }
}

/// Replica-side tracker of the last fencing token seen
///
/// A replica polls the lock and feeds each snapshot to `observe`; a changed
/// token means some instance was granted the lock since the last poll and
/// the replica should reload.
#[derive(Debug, Clone, Default)]
pub struct TokenWatch {
    last_seen: Option<FencingToken>,
}

impl TokenWatch {
    /// A watch with no baseline; the first observation reports a change
    pub fn new() -> Self {
        Self::default()
    }

    /// A watch for a replica loaded while `token` was current
    pub fn starting_at(token: FencingToken) -> Self {
        Self {
            last_seen: Some(token),
        }
    }

    /// Record the snapshot's token and report whether it moved
    pub fn observe(&mut self, snapshot: &LockSnapshot) -> bool {
        let changed = self.last_seen != Some(snapshot.fencing_token);
        self.last_seen = Some(snapshot.fencing_token);
        changed
    }

    pub fn last_seen(&self) -> Option<FencingToken> {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::datastores::DatastoreRegistry;
    use crate::store::memory::InMemoryCoordinationStore;
    use assert_matches::assert_matches;
    use common::ManualClock;

    const STORE: StoreId = StoreId::new(1);

    async fn setup() -> (WriteLockCoordinator, ManualClock) {
        let clock = ManualClock::starting_now();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        DatastoreRegistry::new(store.clone(), Arc::new(clock.clone()))
            .register(STORE, "catalog")
            .await
            .unwrap();

        let coordinator = WriteLockCoordinator::new(
            store,
            Arc::new(clock.clone()),
            CoordinatorSettings::default(),
        );

        (coordinator, clock)
    }

    #[tokio::test]
    async fn test_acquire_grants_first_token() {
        let (coordinator, clock) = setup().await;

        let grant = coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();

        assert_eq!(grant.fencing_token, FencingToken::new(1));
        assert_eq!(grant.acquired_at, clock.now());
        assert_eq!(grant.lease_expires_at, clock.now() + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_second_instance_sees_lock_held() {
        let (coordinator, _) = setup().await;
        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();

        let err = coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap_err();
        assert_matches!(err, DatastoreError::LockHeld { holder: Some(ref h), .. } if h == "api-1");
    }

    #[tokio::test]
    async fn test_reentrant_acquire_issues_new_token() {
        let (coordinator, _) = setup().await;
        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();

        let again = coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();
        assert_eq!(again.fencing_token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let (coordinator, clock) = setup().await;
        coordinator
            .acquire(STORE, "catalog", "api-1", Some(Duration::from_secs(30)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(30));
        assert_matches!(
            coordinator.acquire(STORE, "catalog", "api-2", None).await,
            Err(DatastoreError::LockHeld { .. })
        );

        clock.advance(Duration::from_secs(1));
        let grant = coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap();
        assert_eq!(grant.fencing_token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_renew_keeps_token() {
        let (coordinator, clock) = setup().await;
        let grant = coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();

        clock.advance(Duration::from_secs(20));
        let renewed = coordinator.renew(STORE, "catalog", "api-1").await.unwrap();

        assert_eq!(renewed.fencing_token, grant.fencing_token);
        assert_eq!(renewed.acquired_at, grant.acquired_at);
        assert_eq!(renewed.lease_expires_at, clock.now() + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_renew_extends_by_granted_lease() {
        let (coordinator, clock) = setup().await;
        coordinator
            .acquire(STORE, "catalog", "api-1", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(3));
        let renewed = coordinator.renew(STORE, "catalog", "api-1").await.unwrap();
        assert_eq!(renewed.lease_expires_at, clock.now() + chrono::Duration::seconds(5));

        // A lease of 5s lapses 5s after the renewal, not 30s
        clock.advance(Duration::from_secs(6));
        let taken = coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap();
        assert_eq!(taken.fencing_token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_renew_by_non_holder_is_refused() {
        let (coordinator, _) = setup().await;

        assert_matches!(
            coordinator.renew(STORE, "catalog", "api-1").await,
            Err(DatastoreError::LockHeld { holder: None, .. })
        );

        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();
        assert_matches!(
            coordinator.renew(STORE, "catalog", "api-2").await,
            Err(DatastoreError::LockHeld { .. })
        );
    }

    #[tokio::test]
    async fn test_release_keeps_token() {
        let (coordinator, _) = setup().await;
        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();

        assert!(coordinator.release(STORE, "catalog", "api-1").await.unwrap());

        let snapshot = coordinator.get(STORE, "catalog").await.unwrap();
        assert_eq!(snapshot.holder, None);
        assert_eq!(snapshot.fencing_token, FencingToken::new(1));

        let next = coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap();
        assert_eq!(next.fencing_token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_noop() {
        let (coordinator, _) = setup().await;
        assert!(!coordinator.release(STORE, "catalog", "api-1").await.unwrap());

        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();
        assert!(!coordinator.release(STORE, "catalog", "api-2").await.unwrap());

        let state = coordinator.state(STORE, "catalog").await.unwrap();
        assert_matches!(state, LockState::Held { ref holder, .. } if holder == "api-1");
    }

    #[tokio::test]
    async fn test_get_never_acquired_lock() {
        let (coordinator, _) = setup().await;

        let snapshot = coordinator.get(STORE, "catalog").await.unwrap();
        assert_eq!(snapshot.fencing_token, FencingToken::INITIAL);
        assert_eq!(snapshot.holder, None);

        assert_matches!(
            coordinator.get(STORE, "orders").await,
            Err(DatastoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_unregistered_datastore_is_not_found() {
        let (coordinator, _) = setup().await;

        assert_matches!(
            coordinator.acquire(STORE, "orders", "api-1", None).await,
            Err(DatastoreError::NotFound(_))
        );
        assert_matches!(
            coordinator.release(StoreId::new(2), "catalog", "api-1").await,
            Err(DatastoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (coordinator, _) = setup().await;

        assert_matches!(
            coordinator.acquire(STORE, "catalog", "", None).await,
            Err(DatastoreError::InvalidArgument(_))
        );
        assert_matches!(
            coordinator.acquire(STORE, "catalog", "api-1", Some(Duration::ZERO)).await,
            Err(DatastoreError::InvalidArgument(_))
        );
    }

    #[tokio::test]
    async fn test_check_fence() {
        let (coordinator, clock) = setup().await;
        let first = coordinator
            .acquire(STORE, "catalog", "api-1", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(coordinator.check_fence(STORE, "catalog", first.fencing_token).await.is_ok());

        clock.advance(Duration::from_secs(6));
        let second = coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap();

        let err = coordinator
            .check_fence(STORE, "catalog", first.fencing_token)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DatastoreError::StaleToken {
                presented: first.fencing_token,
                current: second.fencing_token,
            }
        );
    }

    #[tokio::test]
    async fn test_token_watch_reports_new_grants() {
        let (coordinator, _) = setup().await;
        let mut watch = TokenWatch::new();

        assert!(watch.observe(&coordinator.get(STORE, "catalog").await.unwrap()));
        assert!(!watch.observe(&coordinator.get(STORE, "catalog").await.unwrap()));

        coordinator.acquire(STORE, "catalog", "api-1", None).await.unwrap();
        assert!(watch.observe(&coordinator.get(STORE, "catalog").await.unwrap()));

        coordinator.release(STORE, "catalog", "api-1").await.unwrap();
        assert!(!watch.observe(&coordinator.get(STORE, "catalog").await.unwrap()));
        assert_eq!(watch.last_seen(), Some(FencingToken::new(1)));
    }

    #[tokio::test]
    async fn test_local_callers_serialize() {
        let (coordinator, _) = setup().await;
        let coordinator = Arc::new(coordinator);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .acquire(STORE, "catalog", &format!("api-{}", i), None)
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DatastoreError::LockHeld { .. })));
        assert!(coordinator.local_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_local_mutexes_are_dropped_after_use() {
        let (coordinator, _) = setup().await;

        for i in 0..50 {
            let name = format!("api-{}", i);
            let _ = coordinator.acquire(STORE, "catalog", &name, None).await;
            let _ = coordinator.renew(STORE, "catalog", &name).await;
            let _ = coordinator.release(STORE, "catalog", &name).await;
        }
        let _ = coordinator.acquire(STORE, "orders", "api-1", None).await;

        assert!(coordinator.local_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_recorded_when_exporter_installed_later() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};
        use observability::metrics::names;

        // The coordinator exists before any recorder, as in the binary
        let (coordinator, clock) = setup().await;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _installed = metrics::set_default_local_recorder(&recorder);

        coordinator
            .acquire(STORE, "catalog", "api-1", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        coordinator.renew(STORE, "catalog", "api-1").await.unwrap();
        clock.advance(Duration::from_secs(6));
        coordinator.acquire(STORE, "catalog", "api-2", None).await.unwrap();
        coordinator.release(STORE, "catalog", "api-2").await.unwrap();

        let counters: HashMap<String, u64> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(n) => Some((key.key().name().to_string(), n)),
                _ => None,
            })
            .fold(HashMap::new(), |mut totals, (name, n)| {
                *totals.entry(name).or_default() += n;
                totals
            });

        assert_eq!(counters.get(names::LOCK_ACQUISITIONS), Some(&2));
        assert_eq!(counters.get(names::LOCK_RENEWALS), Some(&1));
        assert_eq!(counters.get(names::LOCK_RECLAIMS), Some(&1));
        assert_eq!(counters.get(names::LOCK_RELEASES), Some(&1));
    }
}
