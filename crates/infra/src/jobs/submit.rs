//! Submission boundary: persist a queued job, then hand its id to the workers.

use tracing::{error, info};

use jobforge_core::{DomainError, Job, JobType, MAX_PAYLOAD_LEN};

use super::queue::{QueueError, WorkQueue};
use super::store::{JobStore, JobStoreError};

/// A request to run a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitJob {
    pub job_type: JobType,
    /// Serialized payload; stored as-is.
    pub payload: String,
    /// Non-positive or missing falls back to the default budget.
    pub max_attempts: Option<i64>,
}

impl SubmitJob {
    pub fn new(job_type: JobType, payload: impl Into<String>) -> Self {
        Self {
            job_type,
            payload: payload.into(),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Creates jobs and enqueues them.
#[derive(Debug, Clone)]
pub struct JobSubmitter<S, Q> {
    store: S,
    queue: Q,
}

impl<S, Q> JobSubmitter<S, Q>
where
    S: JobStore,
    Q: WorkQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Persist a `Queued` job and enqueue its id.
    ///
    /// The payload is only checked for size. If the enqueue fails the job
    /// stays persisted as `Queued`.
    pub async fn submit(&self, request: SubmitJob) -> Result<Job, SubmitError> {
        if request.payload.len() > MAX_PAYLOAD_LEN {
            return Err(DomainError::validation(format!(
                "payload is {} bytes, limit is {MAX_PAYLOAD_LEN}",
                request.payload.len()
            ))
            .into());
        }

        let job = Job::new(request.job_type, request.payload, request.max_attempts);
        self.store.create(&job).await?;

        if let Err(e) = self.queue.enqueue(job.id).await {
            error!(job_id = %job.id, error = %e, "job persisted but could not be enqueued");
            return Err(e.into());
        }

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            max_attempts = job.max_attempts,
            "job submitted"
        );
        Ok(job)
    }
}
