//! PostgreSQL implementation of the `CoordinationStore` trait.
//!
//! Three tables hold the shared state (see `migrations/`):
//! - `local_datastores`
//! - `datastore_instances` (foreign key to `local_datastores`)
//! - `datastore_write_locks` (foreign key to `local_datastores`)
//!
//! The lock compare-and-swap is a single conditional `UPDATE` matching the
//! previously observed holder, token and expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::StoreId;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{DatastoreError, DatastoreResult};
use crate::store::traits::CoordinationStore;
use crate::types::{Datastore, FencingToken, Instance, LockKey, WriteLock};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL-backed coordination store.
#[derive(Debug, Clone)]
pub struct PostgresCoordinationStore {
    pool: PgPool,
}

impl PostgresCoordinationStore {
    /// Connect a new pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> DatastoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| {
                DatastoreError::Unavailable(format!("Failed to connect to database: {}", e))
            })?;

        info!(max_connections, "Connected to PostgreSQL coordination store");

        Ok(Self { pool })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the migration SQL to create tables.
    pub async fn run_migrations(&self) -> DatastoreResult<()> {
        let migration_sql = include_str!("../../../../migrations/001_create_datastore_tables.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DatastoreError::Storage(format!("Migration failed: {}", e)))?;
        info!("Database migrations completed successfully");
        Ok(())
    }
}

/// Connectivity failures are reported as `Unavailable`, constraint and
/// statement failures as `Storage`.
fn map_sqlx_error(err: sqlx::Error) -> DatastoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            DatastoreError::not_found(format!("datastore is not registered: {}", db.message()))
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DatastoreError::Unavailable(err.to_string()),
        _ => DatastoreError::Storage(err.to_string()),
    }
}

fn token_to_db(token: FencingToken) -> DatastoreResult<i64> {
    i64::try_from(token.get())
        .map_err(|_| DatastoreError::Internal(format!("fencing token {} out of range", token)))
}

fn token_from_db(raw: i64) -> DatastoreResult<FencingToken> {
    u64::try_from(raw)
        .map(FencingToken::new)
        .map_err(|_| DatastoreError::Storage(format!("negative fencing token {} in lock row", raw)))
}

fn row_to_datastore(row: &PgRow) -> DatastoreResult<Datastore> {
    Ok(Datastore {
        store_id: StoreId::new(row.try_get("store_id").map_err(map_sqlx_error)?),
        name: row.try_get("name").map_err(map_sqlx_error)?,
        reload: row.try_get("reload").map_err(map_sqlx_error)?,
        reload_requested_at: row.try_get("reload_requested_at").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
    })
}

fn row_to_instance(row: &PgRow) -> DatastoreResult<Instance> {
    Ok(Instance {
        name: row.try_get("name").map_err(map_sqlx_error)?,
        datastore_name: row.try_get("datastore_name").map_err(map_sqlx_error)?,
        store_id: StoreId::new(row.try_get("store_id").map_err(map_sqlx_error)?),
        registered_at: row.try_get("registered_at").map_err(map_sqlx_error)?,
        last_seen: row.try_get("last_seen").map_err(map_sqlx_error)?,
    })
}

fn row_to_lock(row: &PgRow) -> DatastoreResult<WriteLock> {
    let token: i64 = row.try_get("fencing_token").map_err(map_sqlx_error)?;
    Ok(WriteLock {
        store_id: StoreId::new(row.try_get("store_id").map_err(map_sqlx_error)?),
        datastore_name: row.try_get("datastore_name").map_err(map_sqlx_error)?,
        holder: row.try_get("holder").map_err(map_sqlx_error)?,
        fencing_token: token_from_db(token)?,
        acquired_at: row
            .try_get::<Option<DateTime<Utc>>, _>("acquired_at")
            .map_err(map_sqlx_error)?,
        lease_expires_at: row
            .try_get::<Option<DateTime<Utc>>, _>("lease_expires_at")
            .map_err(map_sqlx_error)?,
        lease_millis: row
            .try_get::<Option<i64>, _>("lease_millis")
            .map_err(map_sqlx_error)?
            .and_then(|ms| u64::try_from(ms).ok()),
    })
}

fn lease_to_db(lease_millis: Option<u64>) -> Option<i64> {
    lease_millis.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX))
}

#[async_trait]
impl CoordinationStore for PostgresCoordinationStore {
    #[instrument(
        skip(self, datastore),
        fields(store_id = %datastore.store_id, datastore = %datastore.name)
    )]
    async fn insert_datastore_if_absent(&self, datastore: Datastore) -> DatastoreResult<Datastore> {
        sqlx::query(
            r#"
            INSERT INTO local_datastores (store_id, name, reload, reload_requested_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id, name) DO NOTHING
            "#,
        )
        .bind(datastore.store_id.get())
        .bind(&datastore.name)
        .bind(datastore.reload)
        .bind(datastore.reload_requested_at)
        .bind(datastore.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.get_datastore(datastore.store_id, &datastore.name)
            .await?
            .ok_or_else(|| DatastoreError::Internal("datastore vanished after insert".to_string()))
    }

    #[instrument(skip(self))]
    async fn get_datastore(
        &self,
        store_id: StoreId,
        name: &str,
    ) -> DatastoreResult<Option<Datastore>> {
        let row = sqlx::query("SELECT * FROM local_datastores WHERE store_id = $1 AND name = $2")
            .bind(store_id.get())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_datastore).transpose()
    }

    #[instrument(
        skip(self, datastore),
        fields(store_id = %datastore.store_id, datastore = %datastore.name)
    )]
    async fn update_datastore(&self, datastore: &Datastore) -> DatastoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE local_datastores
            SET reload = $3, reload_requested_at = $4
            WHERE store_id = $1 AND name = $2
            "#,
        )
        .bind(datastore.store_id.get())
        .bind(&datastore.name)
        .bind(datastore.reload)
        .bind(datastore.reload_requested_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(DatastoreError::not_found(format!(
                "datastore '{}' in store {}",
                datastore.name, datastore.store_id
            )));
        }
        Ok(())
    }

    #[instrument(
        skip(self, instance),
        fields(
            store_id = %instance.store_id,
            datastore = %instance.datastore_name,
            instance = %instance.name
        )
    )]
    async fn upsert_instance(&self, instance: Instance) -> DatastoreResult<Instance> {
        let row = sqlx::query(
            r#"
            INSERT INTO datastore_instances
                (store_id, datastore_name, name, registered_at, last_seen)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id, datastore_name, name)
            DO UPDATE SET last_seen = EXCLUDED.last_seen
            RETURNING *
            "#,
        )
        .bind(instance.store_id.get())
        .bind(&instance.datastore_name)
        .bind(&instance.name)
        .bind(instance.registered_at)
        .bind(instance.last_seen)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row_to_instance(&row)
    }

    #[instrument(skip(self))]
    async fn get_instance(
        &self,
        store_id: StoreId,
        datastore_name: &str,
        name: &str,
    ) -> DatastoreResult<Option<Instance>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM datastore_instances
            WHERE store_id = $1 AND datastore_name = $2 AND name = $3
            "#,

        )
        .bind(store_id.get())
        .bind(datastore_name)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_instance).transpose()
    }

    #[instrument(skip(self))]
    async fn list_instances(
        &self,
        store_id: StoreId,
        datastore_name: &str,
    ) -> DatastoreResult<Vec<Instance>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM datastore_instances
            WHERE store_id = $1 AND datastore_name = $2
            ORDER BY registered_at ASC, name ASC
            "#,
        )
        .bind(store_id.get())
        .bind(datastore_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_instance).collect()
    }

    #[instrument(skip(self), fields(store_id = %key.store_id, datastore = %key.datastore_name))]
    async fn get_lock(&self, key: &LockKey) -> DatastoreResult<Option<WriteLock>> {
        let row = sqlx::query(
            "SELECT * FROM datastore_write_locks WHERE store_id = $1 AND datastore_name = $2",
        )
        .bind(key.store_id.get())
        .bind(&key.datastore_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_lock).transpose()
    }

    #[instrument(
        skip(self, lock),
        fields(store_id = %lock.store_id, datastore = %lock.datastore_name)
    )]
    async fn insert_lock_if_absent(&self, lock: WriteLock) -> DatastoreResult<WriteLock> {
        sqlx::query(
            r#"
            INSERT INTO datastore_write_locks
                (store_id, datastore_name, holder, fencing_token,
                 acquired_at, lease_expires_at, lease_millis)

            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (store_id, datastore_name) DO NOTHING
            "#,
        )
        .bind(lock.store_id.get())
        .bind(&lock.datastore_name)
        .bind(&lock.holder)
        .bind(token_to_db(lock.fencing_token)?)
        .bind(lock.acquired_at)
        .bind(lock.lease_expires_at)
        .bind(lease_to_db(lock.lease_millis))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.get_lock(&lock.key())
            .await?
            .ok_or_else(|| DatastoreError::Internal("lock row vanished after insert".to_string()))
    }

    #[instrument(
        skip(self, expected, new),
        fields(
            store_id = %expected.store_id,
            datastore = %expected.datastore_name,
            token = %expected.fencing_token
        )
    )]
    async fn compare_and_swap_lock(
        &self,
        expected: &WriteLock,
        new: &WriteLock,
    ) -> DatastoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE datastore_write_locks
            SET holder = $1,
                fencing_token = $2,
                acquired_at = $3,
                lease_expires_at = $4,
                lease_millis = $5
            WHERE store_id = $6
              AND datastore_name = $7
              AND fencing_token = $8
              AND holder IS NOT DISTINCT FROM $9
              AND lease_expires_at IS NOT DISTINCT FROM $10
            "#,
        )
        .bind(&new.holder)
        .bind(token_to_db(new.fencing_token)?)
        .bind(new.acquired_at)
        .bind(new.lease_expires_at)
        .bind(lease_to_db(new.lease_millis))
        .bind(expected.store_id.get())
        .bind(&expected.datastore_name)
        .bind(token_to_db(expected.fencing_token)?)
        .bind(&expected.holder)
        .bind(expected.lease_expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let swapped = result.rows_affected() == 1;
        debug!(swapped, "Lock compare-and-swap");
        Ok(swapped)
    }

    async fn ping(&self) -> DatastoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_token_conversion_bounds() {
        assert_eq!(token_to_db(FencingToken::new(7)).unwrap(), 7);
        assert_matches!(
            token_to_db(FencingToken::new(u64::MAX)),
            Err(DatastoreError::Internal(_))
        );
        assert_matches!(token_from_db(-1), Err(DatastoreError::Storage(_)));
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert_matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            DatastoreError::Unavailable(_)
        );
        assert_matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            DatastoreError::Storage(_)
        );
    }
}
