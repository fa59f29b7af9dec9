use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{ApplicationId, ApplicationStatus, ApplicationSubmission, Milestone};
use super::machine::{MilestoneError, TransitionError};
use super::repository::RentalRepository;
use super::service::{RentalApplicationService, RentalServiceError};
use crate::access::Authenticated;
use crate::notify::Notifier;
use crate::repository::RepositoryError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusChangeRequest {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilestoneRequest {
    pub milestone: Milestone,
}

/// Router builder exposing the rental application endpoints.
pub fn rental_router<R, N>(service: Arc<RentalApplicationService<R, N>>) -> Router
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(submit_handler::<R, N>))
        .route("/api/v1/applications/:application_id", get(fetch_handler::<R, N>))
        .route(
            "/api/v1/applications/:application_id/status",
            put(status_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/milestones",
            post(milestone_handler::<R, N>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<R, N>(
    State(service): State<Arc<RentalApplicationService<R, N>>>,
    Authenticated(actor): Authenticated,
    Json(submission): Json<ApplicationSubmission>,
) -> Response
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    match service.submit(&actor, submission) {
        Ok(application) => (StatusCode::CREATED, Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn fetch_handler<R, N>(
    State(service): State<Arc<RentalApplicationService<R, N>>>,
    Authenticated(actor): Authenticated,
    Path(application_id): Path<String>,
) -> Response
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    match service.get(&actor, &ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<Arc<RentalApplicationService<R, N>>>,
    Authenticated(actor): Authenticated,
    Path(application_id): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> Response
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    let id = ApplicationId(application_id);
    match service.transition(&actor, &id, request.status, request.note) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn milestone_handler<R, N>(
    State(service): State<Arc<RentalApplicationService<R, N>>>,
    Authenticated(actor): Authenticated,
    Path(application_id): Path<String>,
    Json(request): Json<MilestoneRequest>,
) -> Response
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    let id = ApplicationId(application_id);
    match service.record_milestone(&actor, &id, request.milestone) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: RentalServiceError) -> Response {
    match &err {
        RentalServiceError::Transition(TransitionError::InvalidTransition {
            current,
            requested,
            missing,
        }) => {
            let payload = json!({
                "error": err.to_string(),
                "current_status": current,
                "requested_status": requested,
                "missing_milestones": missing,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RentalServiceError::Milestone(MilestoneError::NotAllowed { status, .. }) => {
            let payload = json!({
                "error": err.to_string(),
                "current_status": status,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RentalServiceError::PropertyUnavailable(_)
        | RentalServiceError::Repository(RepositoryError::Conflict) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RentalServiceError::NotFound(_)
        | RentalServiceError::PropertyNotFound(_)
        | RentalServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        RentalServiceError::Forbidden(_) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::FORBIDDEN, Json(payload)).into_response()
        }
        RentalServiceError::InvalidTerms => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        RentalServiceError::Repository(RepositoryError::Unavailable(_)) => {
            error!(error = %err, "rental request failed");
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
