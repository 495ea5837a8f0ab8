use metrics_exporter_prometheus::PrometheusHandle;
use minpaku_feasibility::error::AppError;
use minpaku_feasibility::workflows::session::SessionServices;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) services: SessionServices,
}

/// Media type for a flyer on disk, guessed from its extension.
pub(crate) fn media_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Runs blocking provider work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?
}
