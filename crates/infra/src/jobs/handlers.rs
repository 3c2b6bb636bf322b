//! Built-in demo handlers.
//!
//! Both simulate work with a cancellable sleep. They exist so the service is
//! runnable out of the box; real deployments register their own handlers.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobforge_core::{Job, JobType};

use super::registry::{HandlerRegistry, JobHandler, RegistryError};

const FAIL_MARKER: &str = "\"shouldfail\":true";

/// Sleep for `duration` unless `cancel` fires first.
async fn simulate_work(duration: Duration, cancel: &CancellationToken) -> anyhow::Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => anyhow::bail!("operation cancelled"),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Handles `import` jobs.
///
/// Fails on purpose when the payload contains `"shouldFail":true`
/// (case-insensitive), which makes the retry path easy to exercise.
#[derive(Debug, Clone)]
pub struct ImportJobHandler {
    work: Duration,
}

impl ImportJobHandler {
    pub const DEFAULT_WORK: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self::with_work(Self::DEFAULT_WORK)
    }

    pub fn with_work(work: Duration) -> Self {
        Self { work }
    }
}

impl Default for ImportJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ImportJobHandler {
    fn job_type(&self) -> JobType {
        JobType::Import
    }

    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> anyhow::Result<()> {
        info!(job_id = %job.id, payload = %job.payload, "starting import job");

        simulate_work(self.work, cancel).await?;

        if job.payload.to_ascii_lowercase().contains(FAIL_MARKER) {
            anyhow::bail!("Simulated import failure based on payload.");
        }

        info!(job_id = %job.id, "import job completed");
        Ok(())
    }
}

/// Handles `report` jobs.
#[derive(Debug, Clone)]
pub struct ReportJobHandler {
    work: Duration,
}

impl ReportJobHandler {
    pub const DEFAULT_WORK: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_work(Self::DEFAULT_WORK)
    }

    pub fn with_work(work: Duration) -> Self {
        Self { work }
    }
}

impl Default for ReportJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ReportJobHandler {
    fn job_type(&self) -> JobType {
        JobType::Report
    }

    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> anyhow::Result<()> {
        info!(job_id = %job.id, payload = %job.payload, "starting report job");
        simulate_work(self.work, cancel).await?;
        info!(job_id = %job.id, "report job completed");
        Ok(())
    }
}

/// Registry with both demo handlers at their default durations.
pub fn default_registry() -> Result<HandlerRegistry, RegistryError> {
    HandlerRegistry::new()
        .with(ImportJobHandler::new())?
        .with(ReportJobHandler::new())
}
