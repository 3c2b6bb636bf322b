use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};

use jobforge_core::{JobId, JobType};
use jobforge_infra::jobs::SubmitJob;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/:id", get(get_job))
        .route("/:id/logs", get(get_job_logs))
}

pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SubmitJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    let job_type = match body.job_type.parse::<JobType>() {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let payload = match serde_json::to_string(&body.payload) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_payload", e.to_string()),
    };

    let request = SubmitJob {
        job_type,
        payload,
        max_attempts: body.max_attempts,
    };

    match services.submit(request).await {
        Ok(job) => {
            let status_url = dto::status_url(job.id);
            (
                StatusCode::CREATED,
                [(header::LOCATION, status_url.clone())],
                Json(dto::SubmitJobResponse {
                    job_id: job.id,
                    status_url,
                }),
            )
                .into_response()
        }
        Err(e) => errors::submit_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<JobId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.job(id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Option<Query<dto::ListJobsQuery>>,
) -> axum::response::Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();

    match services.recent_jobs(query.effective_take()).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Attempt history in attempt order; empty for unknown jobs.
pub async fn get_job_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<JobId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.job_attempts(id).await {
        Ok(attempts) => (StatusCode::OK, Json(attempts)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
