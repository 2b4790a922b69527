//! Instance registry
//!
//! Tracks which API processes hold a replica of a datastore. Liveness is
//! derived from `last_seen` and is advisory only: it never decides who may
//! write.

use common::{Clock, StoreId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{DatastoreError, DatastoreResult};
use crate::registry::datastores::missing_datastore;
use crate::store::traits::CoordinationStore;
use crate::types::{validate_identity, Instance};

pub struct InstanceRegistry {
    store: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    liveness_threshold: Duration,
}

impl InstanceRegistry {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        liveness_threshold: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            liveness_threshold,
        }
    }

    /// Insert or refresh an instance, stamping `last_seen` with the current time
    ///
    /// Fails with `NotFound` when the datastore is not registered.
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        name: &str,
        datastore_name: &str,
        store_id: StoreId,
    ) -> DatastoreResult<Instance> {
        validate_identity(
            store_id,
            &[("instance name", name), ("datastore name", datastore_name)],
        )?;

        if self.store.get_datastore(store_id, datastore_name).await?.is_none() {
            return Err(missing_datastore(store_id, datastore_name));
        }

        let instance = self
            .store
            .upsert_instance(Instance::new(name, datastore_name, store_id, self.clock.now()))
            .await?;

        debug!(last_seen = %instance.last_seen, "Instance seen");
        Ok(instance)
    }

    /// Heartbeat; same upsert as `register`
    pub async fn renew(
        &self,
        name: &str,
        datastore_name: &str,
        store_id: StoreId,
    ) -> DatastoreResult<Instance> {
        self.register(name, datastore_name, store_id).await
    }

    pub async fn get(
        &self,
        name: &str,
        datastore_name: &str,
        store_id: StoreId,
    ) -> DatastoreResult<Instance> {
        validate_identity(
            store_id,
            &[("instance name", name), ("datastore name", datastore_name)],
        )?;

        self.store
            .get_instance(store_id, datastore_name, name)
            .await?
            .ok_or_else(|| {
                DatastoreError::not_found(format!(
                    "instance '{}' of datastore '{}' in store {}",
                    name, datastore_name, store_id
                ))
            })
    }

    /// Every instance ever registered, oldest first, stale ones included
    pub async fn list(
        &self,
        datastore_name: &str,
        store_id: StoreId,
    ) -> DatastoreResult<Vec<Instance>> {
        validate_identity(store_id, &[("datastore name", datastore_name)])?;
        self.store.list_instances(store_id, datastore_name).await
    }

    /// Instances whose last heartbeat is within the liveness threshold
    pub async fn list_live(
        &self,
        datastore_name: &str,
        store_id: StoreId,
    ) -> DatastoreResult<Vec<Instance>> {
        let now = self.clock.now();
        let mut instances = self.list(datastore_name, store_id).await?;
        instances.retain(|i| i.is_live(now, self.liveness_threshold));
        Ok(instances)
    }

    pub fn liveness_threshold(&self) -> Duration {
        self.liveness_threshold
    }
}
