use crate::infra::{AppState, InMemoryPolicyStore, NOTIFICATION_LOG_CAPACITY};
use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use travel_desk::workflows::trips::{
    trip_router, NotificationSink, Policy, PolicyId, PolicyRef, PolicyStore, RepositoryError,
    TripLifecycleService, TripRepository,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotificationQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

pub(crate) fn with_trip_routes<R, P, N>(
    service: Arc<TripLifecycleService<R, P, N>>,
) -> axum::Router
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/notifications",
            axum::routing::get(notifications_endpoint),
        )
        .route("/api/v1/policies", axum::routing::post(publish_policy))
        .route("/api/v1/policies/:policy_id", axum::routing::get(latest_policy))
        .route(
            "/api/v1/policies/:policy_id/versions/:version",
            axum::routing::get(policy_version),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Newest-first delivered notifications.
pub(crate) async fn notifications_endpoint(
    Extension(state): Extension<AppState>,
    Query(query): Query<NotificationQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(NOTIFICATION_LOG_CAPACITY)
        .min(NOTIFICATION_LOG_CAPACITY);
    Json(state.notifications.recent(limit))
}

pub(crate) async fn publish_policy(
    Extension(policies): Extension<InMemoryPolicyStore>,
    Json(policy): Json<Policy>,
) -> Response {
    match policies.publish(policy) {
        Ok(reference) => (StatusCode::CREATED, Json(reference)).into_response(),
        Err(err) => storage_error(err),
    }
}

pub(crate) async fn latest_policy(
    Extension(policies): Extension<InMemoryPolicyStore>,
    Path(policy_id): Path<String>,
) -> Response {
    let id = PolicyId(policy_id);
    match policies.get(&id) {
        Ok(Some(policy)) => (StatusCode::OK, Json(policy)).into_response(),
        Ok(None) => policy_missing(&id),
        Err(err) => storage_error(err),
    }
}

pub(crate) async fn policy_version(
    Extension(policies): Extension<InMemoryPolicyStore>,
    Path((policy_id, version)): Path<(String, u32)>,
) -> Response {
    let reference = PolicyRef {
        id: PolicyId(policy_id),
        version,
    };
    match policies.version(&reference) {
        Ok(Some(policy)) => (StatusCode::OK, Json(policy)).into_response(),
        Ok(None) => policy_missing(&reference.id),
        Err(err) => storage_error(err),
    }
}

fn policy_missing(id: &PolicyId) -> Response {
    let payload = json!({ "error": format!("policy {id} not found") });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn storage_error(err: RepositoryError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
