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

use super::domain::{QuestionId, SessionId, TestId, ViolationKind};
use super::repository::{ObserverChannel, SessionStore, StoreError, TestCatalog};
use super::service::{AssessmentService, SessionError};

/// Router builder exposing the session lifecycle endpoints.
pub fn assessment_router<S, C, O>(service: Arc<AssessmentService<S, C, O>>) -> Router
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    Router::new()
        .route(
            "/api/v1/assessment/sessions",
            post(start_handler::<S, C, O>),
        )
        .route(
            "/api/v1/assessment/sessions/:session_id",
            get(session_handler::<S, C, O>),
        )
        .route(
            "/api/v1/assessment/sessions/:session_id/answers",
            post(answer_handler::<S, C, O>),
        )
        .route(
            "/api/v1/assessment/sessions/:session_id/violations",
            post(violation_handler::<S, C, O>),
        )
        .route(
            "/api/v1/assessment/sessions/:session_id/submit",
            post(submit_handler::<S, C, O>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartSessionRequest {
    pub(crate) test_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordAnswerRequest {
    pub(crate) question_id: String,
    pub(crate) value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordViolationRequest {
    pub(crate) kind: ViolationKind,
}

pub(crate) async fn start_handler<S, C, O>(
    State(service): State<Arc<AssessmentService<S, C, O>>>,
    actor: Actor,
    axum::Json(request): axum::Json<StartSessionRequest>,
) -> Response
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    let now = Utc::now();
    match service.start(&actor, &TestId(request.test_id), now) {
        Ok(session) => (StatusCode::CREATED, axum::Json(session.view(now))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn session_handler<S, C, O>(
    State(service): State<Arc<AssessmentService<S, C, O>>>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    let now = Utc::now();
    match service.session(&actor, &SessionId(session_id), now) {
        Ok(session) => (StatusCode::OK, axum::Json(session.view(now))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn answer_handler<S, C, O>(
    State(service): State<Arc<AssessmentService<S, C, O>>>,
    actor: Actor,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<RecordAnswerRequest>,
) -> Response
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    let now = Utc::now();
    match service.record_answer(
        &actor,
        &SessionId(session_id),
        &QuestionId(request.question_id),
        &request.value,
        now,
    ) {
        Ok(session) => (StatusCode::OK, axum::Json(session.view(now))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn violation_handler<S, C, O>(
    State(service): State<Arc<AssessmentService<S, C, O>>>,
    _actor: Actor,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<RecordViolationRequest>,
) -> Response
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    let now = Utc::now();
    match service.record_violation(&SessionId(session_id), request.kind, now) {
        Ok((session, _outcome)) => {
            (StatusCode::OK, axum::Json(session.view(now))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, C, O>(
    State(service): State<Arc<AssessmentService<S, C, O>>>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TestCatalog + 'static,
    O: ObserverChannel + 'static,
{
    let now = Utc::now();
    match service.submit(&actor, &SessionId(session_id), now) {
        Ok(session) => (StatusCode::OK, axum::Json(session.view(now))).into_response(),
        Err(error) => error_response(error),
    }
}

/// Status mapping shared with composite endpoints that drive this workflow.
pub fn error_response(error: SessionError) -> Response {
    let status = match &error {
        SessionError::UnknownTest(_)
        | SessionError::UnknownSession(_)
        | SessionError::UnknownQuestion(_)
        | SessionError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        SessionError::ActiveSession { .. }
        | SessionError::AlreadyPassed { .. }
        | SessionError::ActiveBan { .. }
        | SessionError::AlreadySubmitted { .. }
        | SessionError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
        SessionError::SessionClosed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Forbidden => StatusCode::FORBIDDEN,
        SessionError::Store(StoreError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
