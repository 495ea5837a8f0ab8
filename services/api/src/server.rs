use crate::cli::ServeArgs;
use crate::infra::{blocking, AppState};
use crate::routes::feasibility_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use minpaku_feasibility::config::AppConfig;
use minpaku_feasibility::error::AppError;
use minpaku_feasibility::telemetry;
use minpaku_feasibility::workflows::session::SessionServices;
use std::sync::atomic::{AtomicBool, Ordering};
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

    let provider_config = config.clone();
    let services = blocking(move || Ok(SessionServices::from_config(&provider_config)?)).await?;
    let zoning_files = services.zoning.catalog().all_files().len();
    if zoning_files == 0 {
        info!(data_dir = %config.zoning.data_dir.display(), "no zoning datasets found; lookups will miss");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        services,
    };

    let app = feasibility_routes()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, zoning_files, "minpaku feasibility service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
