use crate::cli::ServeArgs;
use crate::infra::{
    engine_settings, seed_directory, AppState, InMemoryDirectory, InMemoryMarketplaceStore,
    LoggingNotifier,
};
use crate::routes::with_mission_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use mission_core::config::AppConfig;
use mission_core::error::AppError;
use mission_core::telemetry;
use mission_core::workflows::mission::MissionService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let store = Arc::new(InMemoryMarketplaceStore::default());
    let directory = Arc::new(InMemoryDirectory::default());
    seed_directory(&directory);
    let notifier = Arc::new(LoggingNotifier::default());
    let mission_service = Arc::new(MissionService::new(
        store,
        directory,
        notifier,
        engine_settings(config.engine.proposition_sla_hours),
    ));

    let app = with_mission_routes(mission_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "mission lifecycle engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
