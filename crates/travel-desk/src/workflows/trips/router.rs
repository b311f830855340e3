use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, FileMeta, Trip, TripDraft, TripFilter, TripId};
use super::notifications::NotificationSink;
use super::pending::{DecisionId, PendingAction};
use super::policy::PolicyId;
use super::repository::{PolicyStore, RepositoryError, TripRepository};
use super::risk;
use super::service::{RequestOutcome, TripLifecycleService, TripServiceError};

type SharedService<R, P, N> = Arc<TripLifecycleService<R, P, N>>;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    #[serde(flatten)]
    pub draft: TripDraft,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDecisionRequest {
    pub decision_id: DecisionId,
    pub action: PendingAction,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub actor: Actor,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub actor: Actor,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub actor: Actor,
    pub text: String,
}

/// Attachment metadata; a missing content type is guessed from the filename.
#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    pub filename: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl AttachmentRequest {
    fn into_file_meta(self) -> FileMeta {
        let content_type = self
            .content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.filename)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        FileMeta {
            filename: self.filename,
            size_bytes: self.size_bytes,
            content_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RiskRequest {
    pub destination: String,
    #[serde(default)]
    pub start: Option<String>,
}

/// Router exposing the trip lifecycle over HTTP.
pub fn trip_router<R, P, N>(service: SharedService<R, P, N>) -> Router
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/trips",
            post(create_handler::<R, P, N>).get(list_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/decisions",
            post(resolve_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id",
            get(get_handler::<R, P, N>).delete(delete_handler::<R, P, N>),
        )
        .route("/api/v1/trips/:trip_id/audit", get(audit_handler::<R, P, N>))
        .route(
            "/api/v1/trips/:trip_id/approve",
            post(approve_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id/reject",
            post(reject_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id/activate",
            post(activate_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id/complete",
            post(complete_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id/attachments",
            post(attach_handler::<R, P, N>),
        )
        .route(
            "/api/v1/trips/:trip_id/comments",
            post(comment_handler::<R, P, N>),
        )
        .route("/api/v1/risk/assess", post(risk_handler))
        .with_state(service)
}

pub(crate) async fn create_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    axum::Json(request): axum::Json<CreateTripRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    match service.request_trip(request.draft, request.policy_id.as_ref()) {
        Ok(outcome @ RequestOutcome::Committed { .. }) => {
            (StatusCode::CREATED, axum::Json(outcome)).into_response()
        }
        Ok(outcome @ RequestOutcome::PendingDecision { .. }) => {
            (StatusCode::ACCEPTED, axum::Json(outcome)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resolve_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    axum::Json(request): axum::Json<ResolveDecisionRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    let decision_id = request.decision_id;
    match service.resolve_pending(&decision_id, request.action, request.note.as_deref()) {
        Ok(Some(trip)) => (StatusCode::CREATED, axum::Json(trip)).into_response(),
        Ok(None) => {
            let payload = json!({
                "decision_id": decision_id,
                "outcome": "cancelled",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Query(filter): Query<TripFilter>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    match service.list_trips(&filter) {
        Ok(trips) => (StatusCode::OK, axum::Json(trips)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    match service.get_trip(&TripId(trip_id)) {
        Ok(trip) => (StatusCode::OK, axum::Json(trip)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    match service.audit_trail(&TripId(trip_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
    axum::Json(request): axum::Json<ApproveRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.approve(
        &TripId(trip_id),
        &request.actor,
        request.comment.as_deref(),
    ))
}

pub(crate) async fn reject_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.reject(&TripId(trip_id), &request.actor, &request.reason))
}

pub(crate) async fn activate_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.activate(&TripId(trip_id)))
}

pub(crate) async fn complete_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.complete(&TripId(trip_id)))
}

pub(crate) async fn attach_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
    axum::Json(request): axum::Json<AttachmentRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.attach_file(&TripId(trip_id), request.into_file_meta()))
}

pub(crate) async fn comment_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    trip_response(service.add_comment(&TripId(trip_id), &request.actor, &request.text))
}

pub(crate) async fn delete_handler<R, P, N>(
    State(service): State<SharedService<R, P, N>>,
    Path(trip_id): Path<String>,
) -> Response
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    match service.delete(&TripId(trip_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn risk_handler(axum::Json(request): axum::Json<RiskRequest>) -> Response {
    let start = request.start.as_deref().and_then(risk::parse_start);
    let assessment = risk::analyze(&request.destination, start);
    (StatusCode::OK, axum::Json(assessment)).into_response()
}

fn trip_response(result: Result<Trip, TripServiceError>) -> Response {
    match result {
        Ok(trip) => (StatusCode::OK, axum::Json(trip)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Map a service error onto its HTTP status with a `{"error": ...}` body.
pub(crate) fn error_response(err: TripServiceError) -> Response {
    let status = match &err {
        TripServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TripServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
        TripServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        TripServiceError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        TripServiceError::DecisionExpired { .. } => StatusCode::GONE,
        TripServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        TripServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        TripServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
