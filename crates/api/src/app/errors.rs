use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobforge_core::DomainError;
use jobforge_infra::jobs::{JobStoreError, QueueError, SubmitError};

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::Invalid(e) => domain_error_to_response(e),
        SubmitError::Store(e) => store_error_to_response(e),
        SubmitError::Queue(QueueError::Closed) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "queue_closed",
            "the service is shutting down",
        ),
        SubmitError::Queue(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_error", e.to_string()),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        other => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            other.to_string(),
        ),
    }
}

pub fn store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        e @ JobStoreError::AlreadyExists(_) => json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        other => {
            tracing::error!(error = %other, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string())
        }
    }
}

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
