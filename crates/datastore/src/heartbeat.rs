//! Background heartbeat for the local instance.
//!
//! Renews this process in the instance registry for every datastore it
//! serves, once per interval, until cancelled. A failed renewal is logged and
//! retried on the next tick; it never stops the worker.

use common::StoreId;
use observability::CoordinationMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::InstanceRegistry;

pub struct InstanceHeartbeat {
    registry: Arc<InstanceRegistry>,
    instance_name: String,
    datastores: Vec<(StoreId, String)>,
    interval: Duration,
    metrics: CoordinationMetrics,
}

impl InstanceHeartbeat {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        instance_name: impl Into<String>,
        datastores: Vec<(StoreId, String)>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            instance_name: instance_name.into(),
            datastores,
            interval,
            metrics: CoordinationMetrics::new(),
        }
    }

    /// Run on a new task until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            instance = %self.instance_name,
            datastores = self.datastores.len(),
            interval_secs = self.interval.as_secs(),
            "Starting instance heartbeat"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(instance = %self.instance_name, "Instance heartbeat stopped");
                    break;
                }
                _ = timer.tick() => {
                    self.beat().await;
                }
            }
        }
    }

    /// Renew every served datastore once
    ///
    /// # Returns
    /// Number of renewals that failed
    pub async fn beat(&self) -> usize {
        let mut failures = 0;

        for (store_id, datastore) in &self.datastores {
            match self.registry.renew(&self.instance_name, datastore, *store_id).await {
                Ok(_) => {
                    debug!(
                        instance = %self.instance_name,
                        store_id = %store_id,
                        datastore = %datastore,
                        "Heartbeat sent"
                    );
                }
                Err(e) => {
                    failures += 1;
                    self.metrics.heartbeat_failed();
                    warn!(
                        instance = %self.instance_name,
                        store_id = %store_id,
                        datastore = %datastore,
                        error = %e,
                        "Heartbeat failed"
                    );
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DatastoreRegistry;
    use crate::store::memory::InMemoryCoordinationStore;
    use crate::store::traits::CoordinationStore;
    use common::{Clock, ManualClock};

    async fn setup() -> (Arc<InstanceRegistry>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        DatastoreRegistry::new(store.clone(), Arc::new(clock.clone()))
            .register(StoreId::new(1), "catalog")
            .await
            .unwrap();

        let registry =
            InstanceRegistry::new(store, Arc::new(clock.clone()), Duration::from_secs(90));
        (Arc::new(registry), clock)
    }

    #[tokio::test]
    async fn test_beat_counts_failures() {
        let (registry, _) = setup().await;
        let heartbeat = InstanceHeartbeat::new(
            registry.clone(),
            "api-1",
            vec![
                (StoreId::new(1), "catalog".to_string()),
                (StoreId::new(1), "unregistered".to_string()),
            ],
            Duration::from_secs(30),
        );

        assert_eq!(heartbeat.beat().await, 1);
        assert!(registry.get("api-1", "catalog", StoreId::new(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_cancelled() {
        let (registry, clock) = setup().await;
        let heartbeat = InstanceHeartbeat::new(
            registry.clone(),
            "api-1",
            vec![(StoreId::new(1), "catalog".to_string())],
            Duration::from_secs(30),
        );

        let token = CancellationToken::new();
        let handle = heartbeat.spawn(token.clone());

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(1)).await;
        let first = registry.get("api-1", "catalog", StoreId::new(1)).await.unwrap();

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(30)).await;
        let second = registry.get("api-1", "catalog", StoreId::new(1)).await.unwrap();
        assert_eq!(second.last_seen, clock.now());
        assert!(second.last_seen > first.last_seen);

        token.cancel();
        let joined =
            tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(1), handle).await);

        tokio_test::assert_ok!(joined);
    }
}
