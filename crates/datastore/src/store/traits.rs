//! CoordinationStore trait definition

use async_trait::async_trait;
use common::StoreId;

use crate::error::DatastoreResult;
use crate::types::{Datastore, Instance, LockKey, WriteLock};

/// CoordinationStore trait - the shared cell every API instance coordinates
/// through
///
/// Implementations must make each call atomic at row granularity. The lock
/// row is only ever written unconditionally by `insert_lock_if_absent`; every
/// later change goes through `compare_and_swap_lock`.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Insert a datastore unless one with the same identity exists
    ///
    /// # Returns
    /// The stored row: the new one, or the existing one untouched
    async fn insert_datastore_if_absent(&self, datastore: Datastore) -> DatastoreResult<Datastore>;

    /// Look up a datastore by identity
    async fn get_datastore(
        &self,
        store_id: StoreId,
        name: &str,
    ) -> DatastoreResult<Option<Datastore>>;

    /// Overwrite the mutable attributes of an existing datastore
    ///
    /// Fails with `NotFound` when the datastore is not registered.
    async fn update_datastore(&self, datastore: &Datastore) -> DatastoreResult<()>;

    /// Insert or refresh an instance
    ///
    /// An existing row keeps its `registered_at`; only `last_seen` moves.
    /// Fails with `NotFound` when the datastore is not registered.
    ///
    /// # Returns
    /// The stored row after the upsert
    async fn upsert_instance(&self, instance: Instance) -> DatastoreResult<Instance>;

    /// Look up one instance
    async fn get_instance(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        name: &str,
    ) -> DatastoreResult<Option<Instance>>;

    /// All instances of a datastore, oldest registration first, ties by name
    async fn list_instances(
        &self,
        store_id: StoreId,
        datastore_name: &str,
    ) -> DatastoreResult<Vec<Instance>>;

    /// Read the lock row without creating it
    async fn get_lock(&self, key: &LockKey) -> DatastoreResult<Option<WriteLock>>;

    /// Create the lock row unless it exists
    ///
    /// # Returns
    /// The row now stored for the key
    async fn insert_lock_if_absent(&self, lock: WriteLock) -> DatastoreResult<WriteLock>;

    /// Replace `expected` with `new` if the stored row still matches `expected`
    /// on holder, fencing token and lease expiry
    ///
    /// # Returns
    /// `true` if the swap happened, `false` if another writer got there first
    async fn compare_and_swap_lock(
        &self,
        expected: &WriteLock,
        new: &WriteLock,
    ) -> DatastoreResult<bool>;


    /// Check that the backing store answers
    async fn ping(&self) -> DatastoreResult<()>;
}
