use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Actor;

use super::domain::{ApplicationId, NewProject, ProjectId};
use super::ledger::LedgerError;
use super::repository::{ApplicationRepository, NotificationSink, ProjectStore, StoreError};
use super::service::{PlacementError, PlacementService};

/// Router builder exposing projects and the application state machine.
pub fn placement_router<P, R, N>(service: Arc<PlacementService<P, R, N>>) -> Router
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/placement/projects",
            post(create_project_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/projects/:project_id",
            get(project_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/projects/:project_id/audit",
            post(audit_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications",
            post(submit_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id",
            get(application_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/preference",
            post(preference_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/review",
            post(review_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/shortlist",
            post(shortlist_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/approve",
            post(approve_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/reject",
            post(reject_handler::<P, R, N>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/withdraw",
            post(withdraw_handler::<P, R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitApplicationRequest {
    pub(crate) project_id: String,
    pub(crate) preferred_role: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreferenceRequest {
    pub(crate) preferred_role: String,
}

pub(crate) async fn create_project_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    axum::Json(request): axum::Json<NewProject>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.create_project(&actor, request) {
        Ok(project) => (StatusCode::CREATED, axum::Json(project)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn project_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    Path(project_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.project(&ProjectId(project_id)) {
        Ok(project) => (StatusCode::OK, axum::Json(project)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn audit_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(project_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.audit(&actor, &ProjectId(project_id)) {
        Ok(audit) => (StatusCode::OK, axum::Json(audit)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    axum::Json(request): axum::Json<SubmitApplicationRequest>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    let now = Utc::now();
    match service.submit(
        &actor,
        &ProjectId(request.project_id),
        &request.preferred_role,
        now,
    ) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn application_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.application(&ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn preference_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<PreferenceRequest>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.update_preference(
        &actor,
        &ApplicationId(application_id),
        &request.preferred_role,
    ) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.begin_review(&actor, &ApplicationId(application_id), Utc::now()) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn shortlist_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.shortlist(&actor, &ApplicationId(application_id), Utc::now()) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.approve(&actor, &ApplicationId(application_id), Utc::now()) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.reject(&actor, &ApplicationId(application_id), Utc::now()) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn withdraw_handler<P, R, N>(
    State(service): State<Arc<PlacementService<P, R, N>>>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Response
where
    P: ProjectStore + 'static,
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.withdraw(&actor, &ApplicationId(application_id), Utc::now()) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

/// Status mapping shared with composite endpoints that drive this workflow.
pub fn error_response(error: PlacementError) -> Response {
    let status = match &error {
        PlacementError::UnknownProject(_)
        | PlacementError::UnknownApplication(_)
        | PlacementError::Store(StoreError::NotFound)
        | PlacementError::Ledger(LedgerError::RoleNotFound { .. }) => StatusCode::NOT_FOUND,
        PlacementError::DuplicateApplication
        | PlacementError::Store(StoreError::Conflict)
        | PlacementError::Ledger(LedgerError::SlotExhausted { .. })
        | PlacementError::Ledger(LedgerError::TeamFull { .. }) => StatusCode::CONFLICT,
        PlacementError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlacementError::Forbidden => StatusCode::FORBIDDEN,
        PlacementError::Store(StoreError::Unavailable(_)) | PlacementError::Ledger(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
