//! Per-attempt execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;
use crate::job::{MAX_ERROR_LEN, truncate_message};

/// One execution attempt of a job.
///
/// A record is opened before the handler runs and closed exactly once with
/// either [`AttemptRecord::succeed`] or [`AttemptRecord::fail`]. A record that
/// is never closed (`finished_at == None`) marks an interrupted attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub job_id: JobId,
    /// 1-based; equals the job's `attempt_count` when the attempt started.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl AttemptRecord {
    pub fn open(job_id: JobId, attempt_number: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            attempt_number,
            started_at,
            finished_at: None,
            succeeded: false,
            error: None,
            duration_ms: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.finished_at.is_none()
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.close(now)?;
        self.succeeded = true;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, error: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.close(now)?;
        self.succeeded = false;
        self.error = Some(truncate_message(error, MAX_ERROR_LEN));
        Ok(())
    }

    fn close(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.finished_at.is_some() {
            return Err(DomainError::invariant(format!(
                "attempt {} of job {} already finished",
                self.attempt_number, self.job_id
            )));
        }
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        Ok(())
    }
}
