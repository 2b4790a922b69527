//! API handlers for datastore coordination HTTP endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::{Clock, StoreId};
use std::sync::Arc;
use std::time::Duration;

use crate::api::models::*;
use crate::error::DatastoreError;
use crate::manager::DatastoreManager;
use crate::types::{Datastore, Instance};

/// Shared state for the coordination API handlers
pub struct DatastoreApiState {
    pub manager: Arc<DatastoreManager>,
    pub clock: Arc<dyn Clock>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Map a coordination error onto an HTTP status and stable error code
pub fn error_response(err: DatastoreError) -> ApiError {
    let (status, code) = match &err {
        DatastoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        DatastoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        DatastoreError::LockHeld { .. } | DatastoreError::LockContended { .. } => {
            (StatusCode::CONFLICT, "RESOURCE_BUSY")
        }
        DatastoreError::StaleToken { .. } => (StatusCode::CONFLICT, "STALE_TOKEN"),
        DatastoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        DatastoreError::Storage(_) | DatastoreError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "Coordination request failed");
    }

    (
        status,
        Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            },
        }),
    )
}

/// POST /rs/datastore/add
pub async fn add_datastore(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<AddDatastoreRequest>,
) -> ApiResult<Datastore> {
    let datastore = state
        .manager
        .datastores()
        .register(req.store_id, &req.name)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(datastore)))
}

/// PUT /rs/datastore/update
pub async fn update_datastore(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<UpdateDatastoreRequest>,
) -> ApiResult<Datastore> {
    let datastore = state
        .manager
        .datastores()
        .update(req.store_id, &req.name, req.reload)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(datastore)))
}

/// GET /rs/datastore/get/:name/:store_id
pub async fn get_datastore(
    State(state): State<Arc<DatastoreApiState>>,
    Path((name, store_id)): Path<(String, i64)>,
) -> ApiResult<Datastore> {
    let datastore = state
        .manager
        .datastores()
        .get(StoreId::new(store_id), &name)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(datastore)))
}

/// POST /rs/instance/add
pub async fn add_instance(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<InstanceRequest>,
) -> ApiResult<Instance> {
    let instance = state
        .manager
        .instances()
        .register(&req.name, &req.datastore_name, req.store_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(instance)))
}

/// PUT /rs/instance/update
pub async fn update_instance(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<InstanceRequest>,
) -> ApiResult<Instance> {
    let instance = state
        .manager
        .instances()
        .renew(&req.name, &req.datastore_name, req.store_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(instance)))
}

/// GET /rs/instance/get/name/:name/:datastore_name/:store_id
pub async fn get_instance(
    State(state): State<Arc<DatastoreApiState>>,
    Path((name, datastore_name, store_id)): Path<(String, String, i64)>,
) -> ApiResult<Instance> {
    let instance = state
        .manager
        .instances()
        .get(&name, &datastore_name, StoreId::new(store_id))
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(instance)))
}

/// GET /rs/instance/get/list/:datastore_name/:store_id
pub async fn list_instances(
    State(state): State<Arc<DatastoreApiState>>,
    Path((datastore_name, store_id)): Path<(String, i64)>,
) -> ApiResult<Vec<Instance>> {
    let instances = state
        .manager
        .instances()
        .list(&datastore_name, StoreId::new(store_id))
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(instances)))
}

/// POST /rs/dataStoreWriteLock/add
pub async fn acquire_lock(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<AcquireLockRequest>,
) -> ApiResult<GrantResponse> {
    let grant = state
        .manager
        .locks()
        .acquire(
            req.store_id,
            &req.datastore_name,
            &req.instance_name,
            req.lease_seconds.map(Duration::from_secs),
        )
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(grant)))
}

/// PUT /rs/dataStoreWriteLock/update
pub async fn renew_lock(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<LockRequest>,
) -> ApiResult<GrantResponse> {
    let grant = state
        .manager
        .locks()
        .renew(req.store_id, &req.datastore_name, &req.instance_name)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(grant)))
}

/// POST /rs/dataStoreWriteLock/release
pub async fn release_lock(
    State(state): State<Arc<DatastoreApiState>>,
    Json(req): Json<LockRequest>,
) -> ApiResult<ReleaseResponse> {
    let released = state
        .manager
        .locks()
        .release(req.store_id, &req.datastore_name, &req.instance_name)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(ReleaseResponse { released })))
}

/// GET /rs/dataStoreWriteLock/get/:datastore_name/:store_id
pub async fn get_lock(
    State(state): State<Arc<DatastoreApiState>>,
    Path((datastore_name, store_id)): Path<(String, i64)>,
) -> ApiResult<LockResponse> {
    let snapshot = state
        .manager
        .locks()
        .get(StoreId::new(store_id), &datastore_name)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::success(LockResponse::new(snapshot, state.clock.now()))))
}
