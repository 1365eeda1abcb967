use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryInspectionStore};
use crate::routes::with_readings_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use inspection_engine::config::AppConfig;
use inspection_engine::error::AppError;
use inspection_engine::telemetry;
use inspection_engine::workflows::readings::ReadingsService;
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
    config.policy = args.policy.resolve(config.policy);

    telemetry::init(&config.telemetry)?;

    let policy = config.policy.load_table()?;
    info!(
        version = %policy.version,
        source = ?config.policy.table_path,
        "policy table loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryInspectionStore::seeded());
    let readings_service = Arc::new(ReadingsService::new(store, policy));

    let app = with_readings_routes(readings_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "inspection engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
