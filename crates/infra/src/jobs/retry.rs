//! Retry policy and the per-job retry loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobforge_core::Job;

use super::attempt::{AttemptOutcome, execute_attempt};
use super::registry::JobHandler;
use super::store::{JobStore, JobStoreError};

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff policy.
///
/// The delay before retry `i` (0-based: `i = 0` precedes the second attempt)
/// is `min(max_delay, base_delay * 2^i)`. With the defaults this is
/// 1s, 2s, 4s, ... capped at 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Additional attempts allowed after the first one.
    pub fn retry_budget(max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(1)
    }

    /// Backoff before retry `attempt_index` (0-based).
    pub fn delay_for_retry(&self, attempt_index: u32) -> Duration {
        2u32.checked_pow(attempt_index)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Backoff with the default policy: `min(30s, 2^attempt_index s)`.
pub fn backoff_delay(attempt_index: u32) -> Duration {
    RetryPolicy::default().delay_for_retry(attempt_index)
}

/// How the retry loop ended for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    /// The attempt counter guard tripped; this indicates a bug.
    InvariantBreached(String),
    /// Shutdown fired during an attempt or a backoff sleep.
    Interrupted,
}

/// Drives up to `max_attempts` attempts of a single handler for one job.
#[derive(Debug)]
pub struct RetryController<'a, S: ?Sized> {
    store: &'a S,
    policy: RetryPolicy,
    shutdown: &'a CancellationToken,
}

impl<'a, S> RetryController<'a, S>
where
    S: JobStore + ?Sized,
{
    pub fn new(store: &'a S, policy: RetryPolicy, shutdown: &'a CancellationToken) -> Self {
        Self {
            store,
            policy,
            shutdown,
        }
    }

    /// Run attempts until one succeeds, the budget is spent, or shutdown fires.
    ///
    /// `job` must already be `Running` and persisted. Storage failures abort
    /// the loop and leave the job in its last persisted state.
    pub async fn run(
        &self,
        job: &mut Job,
        handler: &Arc<dyn JobHandler>,
    ) -> Result<RetryOutcome, JobStoreError> {
        let retry_budget = RetryPolicy::retry_budget(job.max_attempts);
        let mut retry_index = 0u32;

        loop {
            let error = match execute_attempt(self.store, job, handler, self.shutdown).await? {
                AttemptOutcome::Succeeded => {
                    return Ok(RetryOutcome::Succeeded {
                        attempts: job.attempt_count,
                    });
                }
                AttemptOutcome::Failed(error) => error,
                AttemptOutcome::InvariantBreached(msg) => {
                    return Ok(RetryOutcome::InvariantBreached(msg));
                }
                AttemptOutcome::Interrupted => return Ok(RetryOutcome::Interrupted),
            };

            if retry_index >= retry_budget {
                return Ok(RetryOutcome::Exhausted {
                    attempts: job.attempt_count,
                    last_error: error,
                });
            }

            let delay = self.policy.delay_for_retry(retry_index);
            retry_index += 1;
            warn!(
                job_id = %job.id,
                attempt = job.attempt_count,
                retry = retry_index,
                max_retries = retry_budget,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "job attempt failed, retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(job_id = %job.id, attempt = job.attempt_count, "backoff interrupted by shutdown");
                    return Ok(RetryOutcome::Interrupted);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
