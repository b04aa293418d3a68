//! HTTP API application wiring (Axum router + service wiring).
//!
//! This folder is structured like:
//! - `services.rs`: infrastructure wiring (store + event publisher)
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use catalog_auth::{Hs256JwtValidator, JwtValidator};
use catalog_infra::{ApiConfig, Environment};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let jwt: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.authority.as_deref(),
        config.auth.audience.as_deref(),
    ));

    let services = services::build_services(config).await?;
    Ok(router(services, jwt, config))
}

/// Router over already-built services; used directly by tests.
pub fn router(services: AppServices, jwt: Arc<dyn JwtValidator>, config: &ApiConfig) -> Router {
    let auth_state = middleware::AuthState { jwt };

    routes::router(auth_state)
        .layer(Extension(Arc::new(services)))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config.environment, &config.allowed_origins)),
        )
}

/// Development allows any origin; otherwise only the configured list.
pub fn cors_layer(environment: Environment, allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LOCATION]);

    if environment.is_development() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
