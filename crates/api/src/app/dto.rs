use serde::{Deserialize, Serialize};

use jobforge_core::JobId;

pub const DEFAULT_TAKE: i64 = 20;
pub const MAX_TAKE: i64 = 200;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    /// Any JSON value; stored in its serialized form.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub max_attempts: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub take: Option<i64>,
}

impl ListJobsQuery {
    /// `take` clamped to `1..=200`, default 20.
    pub fn effective_take(&self) -> usize {
        self.take.unwrap_or(DEFAULT_TAKE).clamp(1, MAX_TAKE) as usize
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status_url: String,
}

pub fn status_url(id: JobId) -> String {
    format!("/api/jobs/{id}")
}
