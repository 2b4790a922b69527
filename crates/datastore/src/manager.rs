//! Datastore Manager - the coordination facade held by the HTTP layer and the
//! binary

use common::{Clock, StoreId, SystemClock};
use config::{CoordinationConfig, DatastoreBinding};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coordinator::{CoordinatorSettings, WriteLockCoordinator};
use crate::error::DatastoreResult;
use crate::heartbeat::InstanceHeartbeat;
use crate::registry::{DatastoreRegistry, InstanceRegistry};
use crate::store::memory::InMemoryCoordinationStore;
use crate::store::traits::CoordinationStore;

/// Bundles the datastore registry, instance registry and write-lock
/// coordinator over one backing store and one clock
pub struct DatastoreManager {
    store: Arc<dyn CoordinationStore>,
    datastores: DatastoreRegistry,
    instances: Arc<InstanceRegistry>,
    locks: WriteLockCoordinator,
    heartbeat_interval: Duration,
}

impl DatastoreManager {
    /// Create a new DatastoreManager
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        config: &CoordinationConfig,
    ) -> Self {
        Self {
            datastores: DatastoreRegistry::new(store.clone(), clock.clone()),
            instances: Arc::new(InstanceRegistry::new(
                store.clone(),
                clock.clone(),
                config.liveness_threshold(),
            )),
            locks: WriteLockCoordinator::new(
                store.clone(),
                clock,
                CoordinatorSettings::from(config),
            ),
            heartbeat_interval: config.heartbeat_interval(),
            store,
        }
    }

    /// In-memory backing store and the system clock
    pub fn in_memory(config: &CoordinationConfig) -> Self {
        Self::new(
            Arc::new(InMemoryCoordinationStore::new()),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn datastores(&self) -> &DatastoreRegistry {
        &self.datastores
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn locks(&self) -> &WriteLockCoordinator {
        &self.locks
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> DatastoreResult<()> {
        self.store.ping().await
    }

    /// Register each configured datastore and `instance_name` as one of its
    /// replicas
    pub async fn register_bindings(
        &self,
        instance_name: &str,
        bindings: &[DatastoreBinding],
    ) -> DatastoreResult<()> {
        for binding in bindings {
            let store_id = StoreId::new(binding.store_id);
            self.datastores.register(store_id, &binding.name).await?;
            self.instances.register(instance_name, &binding.name, store_id).await?;
        }

        info!(
            instance = instance_name,
            datastores = bindings.len(),
            "Instance registered"
        );
        Ok(())
    }

    /// Start heartbeating `instance_name` for the given datastores
    pub fn spawn_heartbeat(
        &self,
        instance_name: &str,
        bindings: &[DatastoreBinding],
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let datastores = bindings
            .iter()
            .map(|b| (StoreId::new(b.store_id), b.name.clone()))
            .collect();

        InstanceHeartbeat::new(
            self.instances.clone(),
            instance_name,
            datastores,
            self.heartbeat_interval,
        )
        .spawn(shutdown)
    }

    /// Release whatever lock `instance_name` still holds on the given
    /// datastores; failures are logged and skipped
    ///
    /// # Returns
    /// Number of locks actually released
    pub async fn release_held_locks(
        &self,
        instance_name: &str,
        bindings: &[DatastoreBinding],
    ) -> usize {
        let mut released = 0;

        for binding in bindings {
            let store_id = StoreId::new(binding.store_id);
            match self.locks.release(store_id, &binding.name, instance_name).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        instance = instance_name,
                        store_id = %store_id,
                        datastore = %binding.name,
                        error = %e,
                        "Failed to release write lock on shutdown"
                    );
                }
            }
        }

        released
    }
}
