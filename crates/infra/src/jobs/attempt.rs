//! Execution of a single attempt.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobforge_core::{AttemptRecord, Job};

use super::registry::JobHandler;
use super::store::{JobStore, JobStoreError};

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Handler error message as recorded on the attempt.
    Failed(String),
    /// The attempt could not be opened; nothing was recorded.
    InvariantBreached(String),
    /// Shutdown fired and the handler gave up; the record stays open.
    Interrupted,
}

/// Run one attempt of `handler` against `job`.
///
/// Increments and persists `attempt_count`, appends an open
/// [`AttemptRecord`], runs the handler, then closes the record. The handler
/// runs on its own task, so a panic is recorded as a failed attempt.
pub async fn execute_attempt<S>(
    store: &S,
    job: &mut Job,
    handler: &Arc<dyn JobHandler>,
    shutdown: &CancellationToken,
) -> Result<AttemptOutcome, JobStoreError>
where
    S: JobStore + ?Sized,
{
    let attempt_number = match job.begin_attempt() {
        Ok(n) => n,
        Err(e) => return Ok(AttemptOutcome::InvariantBreached(e.to_string())),
    };
    store.save(job).await?;

    let mut record = AttemptRecord::open(job.id, attempt_number, Utc::now());
    store.append_attempt(&record).await?;

    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = attempt_number,
        max_attempts = job.max_attempts,
        "executing job attempt"
    );

    let result = {
        let handler = handler.clone();
        let snapshot = job.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move { handler.execute(&snapshot, &cancel).await })
            .await
            .unwrap_or_else(|join_err| Err(anyhow::anyhow!("handler panicked: {join_err}")))
    };

    match result {
        Ok(()) => {
            if let Err(e) = record.succeed(Utc::now()) {
                return Ok(AttemptOutcome::InvariantBreached(e.to_string()));
            }
            store.update_attempt(&record).await?;
            debug!(job_id = %job.id, attempt = attempt_number, duration_ms = ?record.duration_ms, "attempt succeeded");
            Ok(AttemptOutcome::Succeeded)
        }
        Err(err) if shutdown.is_cancelled() => {
            info!(
                job_id = %job.id,
                attempt = attempt_number,
                error = %err,
                "attempt interrupted by shutdown, leaving it open"
            );
            Ok(AttemptOutcome::Interrupted)
        }
        Err(err) => {
            let message = err.to_string();
            if let Err(e) = record.fail(&message, Utc::now()) {
                return Ok(AttemptOutcome::InvariantBreached(e.to_string()));
            }
            store.update_attempt(&record).await?;
            warn!(job_id = %job.id, attempt = attempt_number, error = %message, "attempt failed");
            Ok(AttemptOutcome::Failed(message))
        }
    }
}
