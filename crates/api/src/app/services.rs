use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use jobforge_core::{AttemptRecord, Job, JobId};
use jobforge_infra::AppConfig;
use jobforge_infra::jobs::{
    HandlerRegistry, InMemoryJobStore, InMemoryWorkQueue, JobStore, JobStoreError, JobSubmitter,
    JobWorker, RetryPolicy, SubmitError, SubmitJob, WorkQueue, WorkerPool, WorkerPoolHandle,
};

pub type SharedJobStore = Arc<dyn JobStore>;
pub type SharedWorkQueue = Arc<dyn WorkQueue>;

/// Everything the HTTP handlers and the worker pool share.
#[derive(Clone)]
pub struct AppServices {
    store: SharedJobStore,
    queue: SharedWorkQueue,
    registry: Arc<HandlerRegistry>,
    submitter: JobSubmitter<SharedJobStore, SharedWorkQueue>,
}

impl AppServices {
    pub fn new(store: SharedJobStore, queue: SharedWorkQueue, registry: HandlerRegistry) -> Self {
        Self {
            submitter: JobSubmitter::new(store.clone(), queue.clone()),
            store,
            queue,
            registry: Arc::new(registry),
        }
    }

    /// In-memory store and queue.
    pub fn in_memory(registry: HandlerRegistry) -> Self {
        Self::new(
            InMemoryJobStore::arc(),
            Arc::new(InMemoryWorkQueue::new()),
            registry,
        )
    }

    /// Pick the store from configuration: Postgres when `DATABASE_URL` is set
    /// and the `postgres` feature is enabled, in-memory otherwise.
    pub async fn from_config(config: &AppConfig, registry: HandlerRegistry) -> anyhow::Result<Self> {
        let Some(database_url) = config.database_url.as_deref() else {
            tracing::info!("using in-memory job store");
            return Ok(Self::in_memory(registry));
        };

        #[cfg(feature = "postgres")]
        {
            let store = jobforge_infra::jobs::PostgresJobStore::connect(database_url).await?;
            store.migrate().await?;
            tracing::info!("using postgres job store");
            Ok(Self::new(
                Arc::new(store),
                Arc::new(InMemoryWorkQueue::new()),
                registry,
            ))
        }

        #[cfg(not(feature = "postgres"))]
        {
            let _ = database_url;
            tracing::warn!("DATABASE_URL set but built without the postgres feature; using in-memory job store");
            Ok(Self::in_memory(registry))
        }
    }

    pub async fn submit(&self, request: SubmitJob) -> Result<Job, SubmitError> {
        self.submitter.submit(request).await
    }

    pub async fn job(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.store.get(id).await
    }

    pub async fn recent_jobs(&self, take: usize) -> Result<Vec<Job>, JobStoreError> {
        self.store.list_recent(take).await
    }

    pub async fn job_attempts(&self, id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError> {
        self.store.list_attempts(id).await
    }

    /// Start `count` worker loops over the shared queue.
    pub fn spawn_workers(
        &self,
        count: usize,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> WorkerPoolHandle {
        let worker = JobWorker::new(self.store.clone(), self.queue.clone(), self.registry.clone())
            .with_policy(policy);
        WorkerPool::spawn(worker, count, shutdown)
    }
}
