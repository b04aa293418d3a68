use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::get, Router};

use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/alive", get(alive))
        .route("/ready", get(ready))
}

/// Liveness: the process is up.
pub async fn alive() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Healthy")
}

/// Readiness: the store answers.
pub async fn ready(
    Extension(services): Extension<Arc<AppServices>>,
) -> (StatusCode, &'static str) {
    match services.store.ping().await {
        Ok(()) => (StatusCode::OK, "Healthy"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
        }
    }
}
