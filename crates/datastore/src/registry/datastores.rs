//! Datastore registry
//!
//! Names and tracks the logical cache partitions of each store.

use common::{Clock, StoreId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DatastoreError, DatastoreResult};
use crate::store::traits::CoordinationStore;
use crate::types::{validate_identity, Datastore};

pub struct DatastoreRegistry {
    store: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
}

impl DatastoreRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a datastore; registering an existing one is a no-op
    ///
    /// # Returns
    /// The stored datastore, which may predate this call
    pub async fn register(&self, store_id: StoreId, name: &str) -> DatastoreResult<Datastore> {
        validate_identity(store_id, &[("datastore name", name)])?;

        let candidate = Datastore::new(store_id, name, self.clock.now());
        let stored = self.store.insert_datastore_if_absent(candidate.clone()).await?;

        if stored == candidate {
            info!(store_id = %store_id, datastore = name, "Datastore registered");
        } else {
            debug!(store_id = %store_id, datastore = name, "Datastore already registered");
        }
        Ok(stored)
    }

    pub async fn get(&self, store_id: StoreId, name: &str) -> DatastoreResult<Datastore> {
        validate_identity(store_id, &[("datastore name", name)])?;

        self.store
            .get_datastore(store_id, name)
            .await?
            .ok_or_else(|| missing_datastore(store_id, name))
    }

    /// Set or clear the reload flag replicas poll for
    pub async fn update(
        &self,
        store_id: StoreId,
        name: &str,
        reload: bool,
    ) -> DatastoreResult<Datastore> {
        let mut datastore = self.get(store_id, name).await?;

        datastore.reload = reload;
        datastore.reload_requested_at = reload.then(|| self.clock.now());
        self.store.update_datastore(&datastore).await?;

        info!(store_id = %store_id, datastore = name, reload, "Datastore updated");
        Ok(datastore)
    }

    /// Fail with `NotFound` unless the datastore is registered
    pub async fn ensure_exists(&self, store_id: StoreId, name: &str) -> DatastoreResult<()> {
        self.get(store_id, name).await.map(|_| ())
    }
}

pub(crate) fn missing_datastore(store_id: StoreId, name: &str) -> DatastoreError {
    DatastoreError::not_found(format!("datastore '{}' in store {}", name, store_id))
}
