use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use catalog_core::{DomainError, Item, ItemDraft, ItemId, PageRequest};
use catalog_events::{ItemCreatedEvent, ItemDeletedEvent, ItemUpdatedEvent};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;
use crate::middleware::{auth_middleware, AuthState};

/// Reads are public; writes require a bearer token.
pub fn router(auth: AuthState) -> Router {
    let require_auth = || axum::middleware::from_fn_with_state(auth.clone(), auth_middleware);

    Router::new()
        .route(
            "/",
            get(list_items).merge(post(create_item).route_layer(require_auth())),
        )
        .route(
            "/:id",
            get(get_item).merge(
                put(update_item)
                    .delete(delete_item)
                    .route_layer(require_auth()),
            ),
        )
}

fn parse_item_id(raw: &str) -> Result<ItemId, axum::response::Response> {
    ItemId::from_str(raw).map_err(errors::domain_error_to_response)
}

fn not_found() -> axum::response::Response {
    errors::domain_error_to_response(DomainError::not_found("item"))
}

fn parse_draft(
    body: Result<Json<dto::ItemRequest>, JsonRejection>,
) -> Result<ItemDraft, axum::response::Response> {
    let Json(body) = body.map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text())
    })?;

    body.into_draft().map_err(errors::domain_error_to_response)
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListItemsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()),
    };

    let page = PageRequest::from(query);
    if let Err(e) = page.validate() {
        return errors::domain_error_to_response(e.into());
    }

    match services.store.list_items(&page).await {
        Ok(result) => {
            Json(dto::PageResponse::<dto::ItemSummaryResponse>::from(result)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.store.get_item(item_id).await {
        Ok(Some(item)) => Json(dto::ItemDetails::from(item)).into_response(),
        Ok(None) => not_found(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::ItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let draft = match parse_draft(body) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let item = Item::create(ItemId::new(), draft, principal.email());
    if let Err(e) = services.store.insert_item(&item).await {
        return errors::store_error_to_response(e);
    }
    tracing::info!(item_id = %item.id, user = %principal.email(), "item created");

    // Best effort: the write already happened.
    let _ = services
        .publisher
        .publish(&ItemCreatedEvent::new(&item, principal.email()))
        .await;

    let location = format!("/items/{}", item.id);
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(dto::ItemDetails::from(item)),
    )
        .into_response()
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let draft = match parse_draft(body) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let mut item = match services.store.get_item(item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return not_found(),
        Err(e) => return errors::store_error_to_response(e),
    };
    item.apply(draft, principal.email());

    match services.store.update_item(&item).await {
        Ok(true) => {}
        // Deleted between the read and the write.
        Ok(false) => return not_found(),
        Err(e) => return errors::store_error_to_response(e),
    }
    tracing::info!(item_id = %item.id, user = %principal.email(), "item updated");

    let _ = services
        .publisher
        .publish(&ItemUpdatedEvent::new(&item, principal.email()))
        .await;

    StatusCode::NO_CONTENT.into_response()
}

/// Idempotent: deleting a missing item still answers 204 and publishes.
pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let removed = match services.store.delete_item(item_id).await {
        Ok(n) => n,
        Err(e) => return errors::store_error_to_response(e),
    };
    tracing::info!(item_id = %item_id, user = %principal.email(), removed, "item deleted");

    let _ = services
        .publisher
        .publish(&ItemDeletedEvent::new(item_id, principal.email()))
        .await;

    StatusCode::NO_CONTENT.into_response()
}
