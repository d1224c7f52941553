use crate::infra::{
    AppState, InMemoryApplicationRepository, InMemoryProjectStore, InMemorySessionStore,
    LoggingNotificationSink, LoggingObserverChannel, StaticTestCatalog,
};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use talentlink::auth::Actor;
use talentlink::workflows::assessment::router as assessment_routes;
use talentlink::workflows::assessment::{assessment_router, AssessmentService, SessionId};
use talentlink::workflows::placement::router as placement_routes;
use talentlink::workflows::placement::{placement_router, ApplicationId, PlacementService};

pub(crate) type PlacementApi =
    PlacementService<InMemoryProjectStore, InMemoryApplicationRepository, LoggingNotificationSink>;
pub(crate) type AssessmentApi =
    AssessmentService<InMemorySessionStore, StaticTestCatalog, LoggingObserverChannel>;

/// Both workflow services, for endpoints that span the two.
#[derive(Clone)]
pub(crate) struct ApiServices {
    pub(crate) placement: Arc<PlacementApi>,
    pub(crate) assessment: Arc<AssessmentApi>,
}

pub(crate) fn with_workflow_routes(services: ApiServices) -> axum::Router {
    let composite = axum::Router::new()
        .route(
            "/api/v1/placement/applications/:application_id/complete-test",
            axum::routing::post(complete_test_endpoint),
        )
        .with_state(services.clone());

    placement_router(Arc::clone(&services.placement))
        .merge(assessment_router(Arc::clone(&services.assessment)))
        .merge(composite)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
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

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteTestRequest {
    pub(crate) session_id: String,
}

/// Clears the test gate on an application using a finished session. Spans
/// both workflows: the session is read (settling duration expiry lazily)
/// and the application transition is committed.
pub(crate) async fn complete_test_endpoint(
    State(services): State<ApiServices>,
    actor: Actor,
    Path(application_id): Path<String>,
    Json(request): Json<CompleteTestRequest>,
) -> Response {
    let now = Utc::now();
    let session = match services
        .assessment
        .session(&actor, &SessionId(request.session_id), now)
    {
        Ok(session) => session,
        Err(error) => return assessment_routes::error_response(error),
    };

    match services
        .placement
        .complete_test(&actor, &ApplicationId(application_id), &session)
    {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => placement_routes::error_response(error),
    }
}
