use crate::cli::ServeArgs;
use crate::infra::{
    seed_tests, AppState, InMemoryApplicationRepository, InMemoryProjectStore,
    InMemorySessionStore, LoggingNotificationSink, LoggingObserverChannel, StaticTestCatalog,
};
use crate::routes::{with_workflow_routes, ApiServices};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use talentlink::config::AppConfig;
use talentlink::error::AppError;
use talentlink::telemetry;
use talentlink::workflows::assessment::AssessmentService;
use talentlink::workflows::placement::PlacementService;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let projects = Arc::new(InMemoryProjectStore::default());
    let applications = Arc::new(InMemoryApplicationRepository::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let catalog = Arc::new(StaticTestCatalog::new(seed_tests()));

    let services = ApiServices {
        placement: Arc::new(PlacementService::new(
            projects,
            applications,
            Arc::new(LoggingNotificationSink),
        )),
        assessment: Arc::new(AssessmentService::new(
            sessions,
            catalog,
            Arc::new(LoggingObserverChannel),
        )),
    };

    let app = with_workflow_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement platform ready");

    axum::serve(listener, app).await?;
    Ok(())
}
