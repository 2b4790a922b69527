//! Axum route definitions for the coordination API.

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::api::handlers::{self, DatastoreApiState};

/// Create all coordination routes.
///
/// # Routes
///
/// - `POST /rs/datastore/add` - Register a datastore
/// - `PUT /rs/datastore/update` - Set or clear the reload flag
/// - `GET /rs/datastore/get/:name/:store_id` - Get a datastore
/// - `POST /rs/instance/add` - Register an instance
/// - `PUT /rs/instance/update` - Heartbeat an instance
/// - `GET /rs/instance/get/name/:name/:datastore_name/:store_id` - Get an instance
/// - `GET /rs/instance/get/list/:datastore_name/:store_id` - List instances
/// - `POST /rs/dataStoreWriteLock/add` - Acquire the write lock
/// - `PUT /rs/dataStoreWriteLock/update` - Renew the write lock
/// - `POST /rs/dataStoreWriteLock/release` - Release the write lock
/// - `GET /rs/dataStoreWriteLock/get/:datastore_name/:store_id` - Read the write lock
pub fn datastore_routes(state: Arc<DatastoreApiState>) -> Router {
    Router::new()
        .route("/rs/datastore/add", post(handlers::add_datastore))
        .route("/rs/datastore/update", put(handlers::update_datastore))
        .route("/rs/datastore/get/:name/:store_id", get(handlers::get_datastore))
        .route("/rs/instance/add", post(handlers::add_instance))
        .route("/rs/instance/update", put(handlers::update_instance))
        .route(
            "/rs/instance/get/name/:name/:datastore_name/:store_id",
            get(handlers::get_instance),
        )
        .route(
            "/rs/instance/get/list/:datastore_name/:store_id",
            get(handlers::list_instances),
        )
        .route("/rs/dataStoreWriteLock/add", post(handlers::acquire_lock))
        .route("/rs/dataStoreWriteLock/update", put(handlers::renew_lock))
        .route("/rs/dataStoreWriteLock/release", post(handlers::release_lock))
        .route(
            "/rs/dataStoreWriteLock/get/:datastore_name/:store_id",
            get(handlers::get_lock),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DatastoreManager;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use common::{ManualClock, SystemClock};
    use config::CoordinationConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        let manager = DatastoreManager::in_memory(&CoordinationConfig::default());
        datastore_routes(Arc::new(DatastoreApiState {
            manager: Arc::new(manager),
            clock: Arc::new(SystemClock),
        }))
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_datastore_routes() {
        let router = router();

        let (status, body) = call(
            &router,
            Method::POST,
            "/rs/datastore/add",
            Some(json!({"store_id": 1, "name": "catalog"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "catalog");

        let (status, body) = call(
            &router,
            Method::PUT,
            "/rs/datastore/update",
            Some(json!({"store_id": 1, "name": "catalog", "reload": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reload"], true);

        let (status, _) = call(&router, Method::GET, "/rs/datastore/get/catalog/1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&router, Method::GET, "/rs/datastore/get/catalog/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = call(
            &router,
            Method::POST,
            "/rs/datastore/add",
            Some(json!({"store_id": 1, "name": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_instance_routes() {
        let router = router();
        call(
            &router,
            Method::POST,
            "/rs/datastore/add",
            Some(json!({"store_id": 1, "name": "catalog"})),
        )
        .await;

        let instance = json!({"name": "api-1", "datastore_name": "catalog", "store_id": 1});
        let (status, _) = call(
            &router,
            Method::POST,
            "/rs/instance/add",
            Some(instance.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&router, Method::PUT, "/rs/instance/update", Some(instance)).await;
        assert_eq!(status, StatusCode::OK);

        let uri = "/rs/instance/get/name/api-1/catalog/1";
        let (status, body) = call(&router, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "api-1");

        let uri = "/rs/instance/get/list/catalog/1";
        let (status, body) = call(&router, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_routes_report_busy_with_conflict() {
        let router = router();
        call(
            &router,
            Method::POST,
            "/rs/datastore/add",
            Some(json!({"store_id": 1, "name": "catalog"})),
        )
        .await;

        let (status, body) = call(
            &router,
            Method::POST,
            "/rs/dataStoreWriteLock/add",
            Some(json!({"store_id": 1, "datastore_name": "catalog", "instance_name": "api-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["fencing_token"], 1);

        let (status, body) = call(
            &router,
            Method::POST,
            "/rs/dataStoreWriteLock/add",
            Some(json!({"store_id": 1, "datastore_name": "catalog", "instance_name": "api-2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "RESOURCE_BUSY");
        assert_eq!(body["error"]["retryable"], true);

        let (status, _) = call(
            &router,
            Method::PUT,
            "/rs/dataStoreWriteLock/update",
            Some(json!({"store_id": 1, "datastore_name": "catalog", "instance_name": "api-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = "/rs/dataStoreWriteLock/get/catalog/1";
        let (status, body) = call(&router, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["holder"], "api-1");
        assert_eq!(body["data"]["state"]["state"], "held");

        let (status, body) = call(
            &router,
            Method::POST,
            "/rs/dataStoreWriteLock/release",
            Some(json!({"store_id": 1, "datastore_name": "catalog", "instance_name": "api-2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["released"], false);
    }

    #[tokio::test]
    async fn test_lock_state_uses_state_clock() {
        let clock = ManualClock::starting_now();
        let manager = DatastoreManager::new(
            Arc::new(crate::store::memory::InMemoryCoordinationStore::new()),
            Arc::new(clock.clone()),
            &CoordinationConfig::default(),
        );
        let router = datastore_routes(Arc::new(DatastoreApiState {
            manager: Arc::new(manager),
            clock: Arc::new(clock.clone()),
        }));

        call(
            &router,
            Method::POST,
            "/rs/datastore/add",
            Some(json!({"store_id": 1, "name": "catalog"})),
        )
        .await;
        call(
            &router,
            Method::POST,
            "/rs/dataStoreWriteLock/add",
            Some(json!({
                "store_id": 1,
                "datastore_name": "catalog",
                "instance_name": "api-1",
                "lease_seconds": 5
            })),
        )
        .await;

        clock.advance(std::time::Duration::from_secs(6));
        let uri = "/rs/dataStoreWriteLock/get/catalog/1";
        let (_, body) = call(&router, Method::GET, uri, None).await;

        assert_eq!(body["data"]["holder"], "api-1");
        assert_eq!(body["data"]["state"]["state"], "unheld");
    }
}
