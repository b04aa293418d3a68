use axum::Router;

use crate::middleware::AuthState;

pub mod categories;
pub mod items;
pub mod system;

/// Router for all endpoints. Item writes are guarded by `auth`; everything
/// else is public.
pub fn router(auth: AuthState) -> Router {
    Router::new()
        .nest("/items", items::router(auth))
        .nest("/categories", categories::router())
        .nest("/health", system::router())
}
