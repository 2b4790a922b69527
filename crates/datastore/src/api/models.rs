//! API models for datastore coordination HTTP endpoints

use chrono::{DateTime, Utc};
use common::StoreId;
use serde::{Deserialize, Serialize};

use crate::types::{FencingToken, LockGrant, LockSnapshot, LockState};

/// Body of `POST /rs/datastore/add`
#[derive(Debug, Serialize, Deserialize)]
pub struct AddDatastoreRequest {
    pub store_id: StoreId,
    pub name: String,
}

/// Body of `PUT /rs/datastore/update`
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateDatastoreRequest {
    pub store_id: StoreId,
    pub name: String,
    pub reload: bool,
}

/// Body of `POST /rs/instance/add` and `PUT /rs/instance/update`
#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub name: String,
    pub datastore_name: String,
    pub store_id: StoreId,
}

/// Body of `POST /rs/dataStoreWriteLock/add`
#[derive(Debug, Serialize, Deserialize)]
pub struct AcquireLockRequest {
    pub store_id: StoreId,
    pub datastore_name: String,
    pub instance_name: String,
    /// Lease length; the configured default when absent
    #[serde(default)]
    pub lease_seconds: Option<u64>,
}

/// Body of `PUT /rs/dataStoreWriteLock/update` and
/// `POST /rs/dataStoreWriteLock/release`
#[derive(Debug, Serialize, Deserialize)]
pub struct LockRequest {
    pub store_id: StoreId,
    pub datastore_name: String,
    pub instance_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

/// A lock row together with its interpretation at response time
#[derive(Debug, Serialize, Deserialize)]
pub struct LockResponse {
    pub store_id: StoreId,
    pub datastore_name: String,
    pub holder: Option<String>,
    pub fencing_token: FencingToken,
    pub acquired_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub state: LockState,
}

impl LockResponse {
    pub fn new(snapshot: LockSnapshot, now: DateTime<Utc>) -> Self {
        let state = snapshot.state(now);
        Self {
            store_id: snapshot.store_id,
            datastore_name: snapshot.datastore_name,
            holder: snapshot.holder,
            fencing_token: snapshot.fencing_token,
            acquired_at: snapshot.acquired_at,
            lease_expires_at: snapshot.lease_expires_at,
            state,
        }
    }
}

/// Successful grant, as returned by acquire and renew
pub type GrantResponse = LockGrant;

/// Envelope for every successful response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}
