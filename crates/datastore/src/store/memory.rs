//! In-memory coordination store implementation

use async_trait::async_trait;
use common::StoreId;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{DatastoreError, DatastoreResult};
use crate::store::traits::CoordinationStore;
use crate::types::{Datastore, Instance, LockKey, WriteLock};

type DatastoreKey = (StoreId, String);
type InstanceKey = (StoreId, String, String);

/// In-memory coordination store for tests and single-process development
///
/// Share one store between several coordinators (behind an `Arc`) to simulate
/// separate API processes.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    datastores: RwLock<HashMap<DatastoreKey, Datastore>>,
    instances: RwLock<HashMap<InstanceKey, Instance>>,
    locks: RwLock<HashMap<LockKey, WriteLock>>,
}

impl InMemoryCoordinationStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn require_datastore(&self, store_id: StoreId, name: &str) -> DatastoreResult<()> {
        if self.datastores.read().contains_key(&(store_id, name.to_string())) {
            Ok(())
        } else {
            Err(DatastoreError::not_found(format!(
                "datastore '{}' in store {}",
                name, store_id
            )))
        }
    }
}

fn same_lease(stored: &WriteLock, expected: &WriteLock) -> bool {
    stored.holder == expected.holder
        && stored.fencing_token == expected.fencing_token
        && stored.lease_expires_at == expected.lease_expires_at
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn insert_datastore_if_absent(&self, datastore: Datastore) -> DatastoreResult<Datastore> {
        let mut datastores = self.datastores.write();
        let stored = datastores
            .entry((datastore.store_id, datastore.name.clone()))
            .or_insert(datastore);
        Ok(stored.clone())
    }

    async fn get_datastore(
        &self,
        store_id: StoreId,
        name: &str,
    ) -> DatastoreResult<Option<Datastore>> {
        let datastores = self.datastores.read();
        Ok(datastores.get(&(store_id, name.to_string())).cloned())
    }

    async fn update_datastore(&self, datastore: &Datastore) -> DatastoreResult<()> {
        let mut datastores = self.datastores.write();
        match datastores.get_mut(&(datastore.store_id, datastore.name.clone())) {
            Some(stored) => {
                stored.reload = datastore.reload;
                stored.reload_requested_at = datastore.reload_requested_at;
                Ok(())
            }
            None => Err(DatastoreError::not_found(format!(
                "datastore '{}' in store {}",
                datastore.name, datastore.store_id
            ))),
        }
    }

    async fn upsert_instance(&self, instance: Instance) -> DatastoreResult<Instance> {
        self.require_datastore(instance.store_id, &instance.datastore_name)?;

        let mut instances = self.instances.write();
        let key = (
            instance.store_id,
            instance.datastore_name.clone(),
            instance.name.clone(),
        );
        let stored = instances
            .entry(key)
            .and_modify(|existing| existing.last_seen = instance.last_seen)
            .or_insert(instance);
        Ok(stored.clone())
    }

    async fn get_instance(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        name: &str,
    ) -> DatastoreResult<Option<Instance>> {
        let instances = self.instances.read();
        Ok(instances
            .get(&(store_id, datastore_name.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_instances(
        &self,
        store_id: StoreId,
        datastore_name: &str,
    ) -> DatastoreResult<Vec<Instance>> {
        let instances = self.instances.read();
        let mut result: Vec<Instance> = instances
            .values()
            .filter(|i| i.store_id == store_id && i.datastore_name == datastore_name)
            .cloned()
            .collect();

        result.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(result)
    }

    async fn get_lock(&self, key: &LockKey) -> DatastoreResult<Option<WriteLock>> {
        Ok(self.locks.read().get(key).cloned())
    }

    async fn insert_lock_if_absent(&self, lock: WriteLock) -> DatastoreResult<WriteLock> {
        self.require_datastore(lock.store_id, &lock.datastore_name)?;

        let mut locks = self.locks.write();
        let stored = locks.entry(lock.key()).or_insert(lock);
        Ok(stored.clone())
    }

    async fn compare_and_swap_lock(
        &self,
        expected: &WriteLock,
        new: &WriteLock,
    ) -> DatastoreResult<bool> {
        let mut locks = self.locks.write();
        match locks.get_mut(&expected.key()) {
            Some(stored) if same_lease(stored, expected) => {
                *stored = new.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> DatastoreResult<()> {
        Ok(())
    }
}
