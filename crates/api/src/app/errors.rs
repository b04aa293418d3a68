use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use catalog_core::{DomainError, ValidationErrors};
use catalog_infra::StoreError;

pub const VALIDATION_PROBLEM_TYPE: &str = "https://tools.ietf.org/html/rfc9110#section-15.5.1";
pub const VALIDATION_PROBLEM_TITLE: &str = "One or more validation errors occurred.";

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 400 problem document listing every invalid field.
pub fn validation_problem(errors: ValidationErrors) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "type": VALIDATION_PROBLEM_TYPE,
            "title": VALIDATION_PROBLEM_TITLE,
            "status": StatusCode::BAD_REQUEST.as_u16(),
            "errors": errors,
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(errors) => validation_problem(errors),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(resource) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{resource} not found"))
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::UnknownCategory(_) => {
            let mut errors = ValidationErrors::new();
            errors.add("categoryId", "The selected category does not exist.");
            validation_problem(errors)
        }
        other => {
            tracing::error!(error = %other, "store operation failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "the catalog store is unavailable",
            )
        }
    }
}
