//! Job worker: pulls ids from the work queue and drives each job to a
//! terminal status.
//!
//! ```text
//! JobWorker::run
//!     │
//!     ├─► WorkQueue::dequeue   (cancellable)
//!     ├─► JobStore::get        (missing ⇒ drop, not Queued ⇒ skip)
//!     ├─► Queued → Running     (persisted)
//!     ├─► HandlerRegistry::resolve (none ⇒ Failed, zero attempts)
//!     ├─► RetryController::run
//!     └─► Running → Succeeded | Failed (persisted)
//! ```
//!
//! Storage failures abort the current cycle only; the loop logs them and
//! moves on to the next id.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jobforge_core::{DomainError, Job, JobId, JobStatus};

use super::queue::{QueueError, WorkQueue};
use super::registry::HandlerRegistry;
use super::retry::{RetryController, RetryOutcome, RetryPolicy};
use super::store::{JobStore, JobStoreError};

/// How one processing cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: String },
    /// The id had no job record.
    NotFound,
    /// The job was not `Queued` when dequeued.
    Skipped(JobStatus),
    /// Shutdown fired mid-job; the last persisted state stands.
    Interrupted,
}

/// Error that aborts a processing cycle.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Worker runtime statistics, shared by every loop of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub skipped: u64,
    pub interrupted: u64,
    pub storage_errors: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        self.processed += 1;
        match outcome {
            JobOutcome::Succeeded { .. } => self.succeeded += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::NotFound => self.dropped += 1,
            JobOutcome::Skipped(_) => self.skipped += 1,
            JobOutcome::Interrupted => self.interrupted += 1,
        }
    }
}

/// Processes jobs handed over by a [`WorkQueue`].
///
/// Cloning is cheap when `S` and `Q` are `Arc`s; clones share statistics.
#[derive(Debug, Clone)]
pub struct JobWorker<S, Q> {
    store: S,
    queue: Q,
    registry: Arc<HandlerRegistry>,
    policy: RetryPolicy,
    name: String,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<S, Q> JobWorker<S, Q>
where
    S: JobStore,
    Q: WorkQueue,
{
    pub fn new(store: S, queue: Q, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            store,
            queue,
            registry,
            policy: RetryPolicy::default(),
            name: "job-worker".to_string(),
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update_stats(&self, f: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    /// Pull and process ids until `shutdown` fires or the queue closes.
    pub async fn run(&self, shutdown: &CancellationToken) {
        info!(worker = %self.name, "job worker started");

        loop {
            let job_id = match self.queue.dequeue(shutdown).await {
                Ok(id) => id,
                Err(QueueError::Cancelled) => break,
                Err(QueueError::Closed) => {
                    info!(worker = %self.name, "work queue closed");
                    break;
                }
            };

            match self.process(job_id, shutdown).await {
                Ok(outcome) => self.update_stats(|s| s.record(&outcome)),
                Err(WorkerError::Store(e)) => {
                    error!(worker = %self.name, job_id = %job_id, error = %e, "storage failure, abandoning job cycle");
                    self.update_stats(|s| s.storage_errors += 1);
                }
                Err(WorkerError::Domain(e)) => {
                    error!(alert = true, worker = %self.name, job_id = %job_id, error = %e, "job state machine rejected a transition");
                }
            }
        }

        info!(worker = %self.name, "job worker stopped");
    }

    /// Drive one job from `Queued` to a terminal status.
    pub async fn process(
        &self,
        job_id: JobId,
        shutdown: &CancellationToken,
    ) -> Result<JobOutcome, WorkerError> {
        let Some(mut job) = self.store.get(job_id).await? else {
            warn!(worker = %self.name, job_id = %job_id, "dequeued job not found, dropping");
            return Ok(JobOutcome::NotFound);
        };

        if job.status != JobStatus::Queued {
            info!(worker = %self.name, job_id = %job_id, status = %job.status, "job is not queued, skipping");
            return Ok(JobOutcome::Skipped(job.status));
        }

        job.start(Utc::now())?;
        self.store.save(&job).await?;
        info!(
            worker = %self.name,
            job_id = %job.id,
            job_type = %job.job_type,
            max_attempts = job.max_attempts,
            "job started"
        );

        let Some(handler) = self.registry.resolve(job.job_type) else {
            let message = format!("No handler registered for job type {}.", job.job_type);
            error!(worker = %self.name, job_id = %job.id, job_type = %job.job_type, "no handler registered, job failed");
            return self.finish_failed(&mut job, message).await;
        };

        let outcome = RetryController::new(&self.store, self.policy, shutdown)
            .run(&mut job, &handler)
            .await?;

        match outcome {
            RetryOutcome::Succeeded { attempts } => {
                job.succeed(Utc::now())?;
                self.store.save(&job).await?;
                info!(worker = %self.name, job_id = %job.id, attempts, "job succeeded");
                Ok(JobOutcome::Succeeded { attempts })
            }
            RetryOutcome::Exhausted { attempts, last_error } => {
                error!(
                    worker = %self.name,
                    job_id = %job.id,
                    attempts,
                    error = %last_error,
                    "job failed after exhausting attempts"
                );
                self.finish_failed(&mut job, last_error).await
            }
            RetryOutcome::InvariantBreached(diagnostic) => {
                error!(
                    alert = true,
                    worker = %self.name,
                    job_id = %job.id,
                    attempt_count = job.attempt_count,
                    max_attempts = job.max_attempts,
                    error = %diagnostic,
                    "attempt invariant violated"
                );
                self.finish_failed(&mut job, diagnostic).await
            }
            RetryOutcome::Interrupted => {
                info!(worker = %self.name, job_id = %job.id, attempt_count = job.attempt_count, "job interrupted by shutdown");
                Ok(JobOutcome::Interrupted)
            }
        }
    }

    async fn finish_failed(&self, job: &mut Job, error: String) -> Result<JobOutcome, WorkerError> {
        job.fail(&error, Utc::now())?;
        self.store.save(job).await?;
        Ok(JobOutcome::Failed {
            attempts: job.attempt_count,
            error: job.last_error.clone().unwrap_or(error),
        })
    }
}

/// Runs several [`JobWorker`] loops as competing consumers of one queue.
#[derive(Debug)]
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `count` loops (at least one) on the current tokio runtime.
    pub fn spawn<S, Q>(
        worker: JobWorker<S, Q>,
        count: usize,
        shutdown: CancellationToken,
    ) -> WorkerPoolHandle
    where
        S: JobStore + Clone + 'static,
        Q: WorkQueue + Clone + 'static,
    {
        let count = count.max(1);
        let stats = worker.stats.clone();

        let tasks = (0..count)
            .map(|i| {
                let name = format!("{}-{}", worker.name, i);
                let w = worker.clone().with_name(name);
                let token = shutdown.clone();
                tokio::spawn(async move { w.run(&token).await })
            })
            .collect();

        info!(workers = count, "worker pool started");

        WorkerPoolHandle {
            shutdown,
            tasks,
            stats,
        }
    }
}

/// Handle to control a running [`WorkerPool`].
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerPoolHandle {
    /// Cancel every loop and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use jobforge_core::{AttemptRecord, JobType};
    use proptest::prelude::*;
    use tokio::time::Instant;

    use crate::jobs::queue::InMemoryWorkQueue;
    use crate::jobs::registry::JobHandler;
    use crate::jobs::store::InMemoryJobStore;

    /// Plays back a script of outcomes (`true` = success), then falls back
    /// to `default_ok`.
    struct TestHandler {
        job_type: JobType,
        script: Mutex<VecDeque<bool>>,
        default_ok: bool,
        calls: AtomicU32,
        seen: Mutex<Vec<JobId>>,
    }

    impl TestHandler {
        fn new(job_type: JobType, script: impl IntoIterator<Item = bool>, default_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                job_type,
                script: Mutex::new(script.into_iter().collect()),
                default_ok,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn always_ok(job_type: JobType) -> Arc<Self> {
            Self::new(job_type, [], true)
        }

        fn always_fail(job_type: JobType) -> Arc<Self> {
            Self::new(job_type, [], false)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for TestHandler {
        fn job_type(&self) -> JobType {
            self.job_type
        }

        async fn execute(&self, job: &Job, _cancel: &CancellationToken) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(job.id);
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(self.default_ok);
            if ok {
                Ok(())
            } else {
                anyhow::bail!("attempt {} failed", job.attempt_count)
            }
        }
    }

    type TestWorker = JobWorker<Arc<InMemoryJobStore>, Arc<InMemoryWorkQueue>>;

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryWorkQueue>,
        worker: TestWorker,
    }

    impl Fixture {
        fn new(handlers: Vec<Arc<TestHandler>>) -> Self {
            let mut registry = HandlerRegistry::new();
            for h in handlers {
                registry.register_arc(h).unwrap();
            }
            let store = InMemoryJobStore::arc();
            let queue = Arc::new(InMemoryWorkQueue::new());
            let worker = JobWorker::new(store.clone(), queue.clone(), Arc::new(registry));
            Self { store, queue, worker }
        }

        async fn submit(&self, job_type: JobType, max_attempts: i64) -> JobId {
            let job = Job::new(job_type, "{}", Some(max_attempts));
            self.store.create(&job).await.unwrap();
            self.queue.enqueue(job.id).await.unwrap();
            job.id
        }

        async fn job(&self, id: JobId) -> Job {
            self.store.get(id).await.unwrap().unwrap()
        }

        async fn attempts(&self, id: JobId) -> Vec<AttemptRecord> {
            self.store.list_attempts(id).await.unwrap()
        }
    }

    fn attempt_numbers(log: &[AttemptRecord]) -> Vec<u32> {
        log.iter().map(|r| r.attempt_number).collect()
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_success() {
        let fx = Fixture::new(vec![TestHandler::always_ok(JobType::Import)]);
        let id = fx.submit(JobType::Import, 3).await;

        let outcome = fx.worker.process(id, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, JobOutcome::Succeeded { attempts: 1 });
        let job = fx.job(id).await;
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempt_count, 1);
        assert!(job.last_error.is_none());
        assert!(job.started_at.is_some() && job.completed_at.is_some());
        job.check_invariants().unwrap();

        let log = fx.attempts(id).await;
        assert_eq!(log.len(), 1);
        assert!(log[0].succeeded);
        assert!(log[0].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fail_succeed_backs_off_one_then_two_seconds() {
        let handler = TestHandler::new(JobType::Import, [false, false, true], false);
        let fx = Fixture::new(vec![handler.clone()]);
        let id = fx.submit(JobType::Import, 3).await;

        let started = Instant::now();
        let outcome = fx.worker.process(id, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, JobOutcome::Succeeded { attempts: 3 });
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(handler.calls(), 3);

        let log = fx.attempts(id).await;
        assert_eq!(log.iter().map(|r| r.succeeded).collect::<Vec<_>>(), vec![false, false, true]);
        assert_eq!(attempt_numbers(&log), vec![1, 2, 3]);
        assert_eq!(fx.job(id).await.status, JobStatus::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_handler_exhausts_budget() {
        let fx = Fixture::new(vec![TestHandler::always_fail(JobType::Report)]);
        let id = fx.submit(JobType::Report, 3).await;

        let outcome = fx.worker.process(id, &CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                attempts: 3,
                error: "attempt 3 failed".to_string()
            }
        );
        let job = fx.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 3);
        assert_eq!(job.last_error.as_deref(), Some("attempt 3 failed"));
        job.check_invariants().unwrap();

        let log = fx.attempts(id).await;
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|r| !r.succeeded && !r.is_in_flight()));
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_type_fails_without_attempts() {
        let fx = Fixture::new(vec![TestHandler::always_ok(JobType::Import)]);
        let id = fx.submit(JobType::Report, 3).await;

        let started = Instant::now();
        let outcome = fx.worker.process(id, &CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Failed { attempts: 0, .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);

        let job = fx.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(
            job.last_error.as_deref(),
            Some("No handler registered for job type report.")
        );
        assert!(job.started_at.is_some());
        assert!(fx.attempts(id).await.is_empty());
    }

    #[tokio::test]
    async fn missing_job_is_dropped() {
        let fx = Fixture::new(vec![]);
        let outcome = fx
            .worker
            .process(JobId::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::NotFound);
    }

    #[tokio::test]
    async fn already_processed_job_is_skipped() {
        let handler = TestHandler::always_ok(JobType::Import);
        let fx = Fixture::new(vec![handler.clone()]);
        let id = fx.submit(JobType::Import, 3).await;
        let cancel = CancellationToken::new();

        fx.worker.process(id, &cancel).await.unwrap();
        let again = fx.worker.process(id, &cancel).await.unwrap();

        assert_eq!(again, JobOutcome::Skipped(JobStatus::Succeeded));
        assert_eq!(handler.calls(), 1);
        assert_eq!(fx.attempts(id).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invariant_breach_fails_job_without_new_attempts() {
        let handler = TestHandler::always_ok(JobType::Import);
        let fx = Fixture::new(vec![handler.clone()]);
        let mut job = Job::new(JobType::Import, "{}", Some(2));
        // Corrupted record: budget already spent while still queued.
        job.attempt_count = 2;
        fx.store.create(&job).await.unwrap();

        let outcome = fx.worker.process(job.id, &CancellationToken::new()).await.unwrap();

        assert!(matches!(&outcome, JobOutcome::Failed { error, .. } if error.contains("attempt limit exceeded")));
        assert_eq!(handler.calls(), 0);
        let stored = fx.job(job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.last_error.unwrap().contains("attempt_count=2, max_attempts=2"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_backoff_stops_worker() {
        let handler = TestHandler::always_fail(JobType::Import);
        let fx = Fixture::new(vec![handler.clone()]);
        let id = fx.submit(JobType::Import, 3).await;

        let pool = WorkerPool::spawn(fx.worker.clone(), 1, CancellationToken::new());
        wait_for(|| handler.calls() == 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let before = fx.job(id).await;
        pool.shutdown().await;

        assert_eq!(handler.calls(), 1);
        let after = fx.job(id).await;
        assert_eq!(after, before);
        assert_eq!(after.status, JobStatus::Running);
        assert_eq!(after.attempt_count, 1);

        let log = fx.attempts(id).await;
        assert_eq!(log.len(), 1);
        assert!(!log[0].is_in_flight());
        assert_eq!(fx.worker.stats().interrupted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn competing_workers_process_each_job_once() {
        let handler = TestHandler::always_ok(JobType::Report);
        let fx = Fixture::new(vec![handler.clone()]);
        let total = 200u64;

        let mut ids = Vec::new();
        for _ in 0..total {
            ids.push(fx.submit(JobType::Report, 3).await);
        }

        let pool = WorkerPool::spawn(fx.worker.clone(), 4, CancellationToken::new());
        assert_eq!(pool.worker_count(), 4);
        wait_for(|| pool.stats().processed == total).await;
        pool.shutdown().await;

        let mut counts: HashMap<JobId, u32> = HashMap::new();
        for id in handler.seen.lock().unwrap().iter() {
            *counts.entry(*id).or_default() += 1;
        }
        assert_eq!(counts.len(), ids.len());
        assert!(counts.values().all(|&n| n == 1));

        for id in ids {
            let job = fx.job(id).await;
            assert_eq!(job.status, JobStatus::Succeeded);
            assert_eq!(job.attempt_count, 1);
        }
        assert_eq!(fx.worker.stats().succeeded, total);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_exits_when_queue_closes() {
        let fx = Fixture::new(vec![TestHandler::always_ok(JobType::Import)]);
        let id = fx.submit(JobType::Import, 1).await;
        fx.queue.close();

        fx.worker.run(&CancellationToken::new()).await;

        assert_eq!(fx.job(id).await.status, JobStatus::Succeeded);
        let stats = fx.worker.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.succeeded, 1);
    }

    /// Store whose first `failing_saves` calls to `save` fail.
    struct FlakyStore {
        inner: InMemoryJobStore,
        failing_saves: AtomicU32,
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
            self.inner.create(job).await
        }

        async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(job_id).await
        }

        async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
            let fail = self
                .failing_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(JobStoreError::storage("connection reset"));
            }
            self.inner.save(job).await
        }

        async fn append_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
            self.inner.append_attempt(record).await
        }

        async fn update_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
            self.inner.update_attempt(record).await
        }

        async fn list_recent(&self, take: usize) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_recent(take).await
        }

        async fn list_attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError> {
            self.inner.list_attempts(job_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_abandons_cycle_and_loop_continues() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryJobStore::new(),
            failing_saves: AtomicU32::new(1),
        });
        let queue = Arc::new(InMemoryWorkQueue::new());
        let mut registry = HandlerRegistry::new();
        registry
            .register_arc(TestHandler::always_ok(JobType::Import))
            .unwrap();
        let worker = JobWorker::new(store.clone(), queue.clone(), Arc::new(registry));

        let first = Job::new(JobType::Import, "{}", None);
        let second = Job::new(JobType::Import, "{}", None);
        for job in [&first, &second] {
            store.create(job).await.unwrap();
            queue.enqueue(job.id).await.unwrap();
        }
        queue.close();

        worker.run(&CancellationToken::new()).await;

        let stats = worker.stats();
        assert_eq!(stats.storage_errors, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(store.get(first.id).await.unwrap().unwrap().status, JobStatus::Queued);
        assert_eq!(store.get(second.id).await.unwrap().unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn pool_spawns_at_least_one_worker() {
        let rt = paused_runtime();
        rt.block_on(async {
            let fx = Fixture::new(vec![]);
            let pool = WorkerPool::spawn(fx.worker.clone(), 0, CancellationToken::new());
            assert_eq!(pool.worker_count(), 1);
            pool.shutdown().await;
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Property: with a handler that never succeeds, the job uses exactly
        /// its budget and never more.
        #[test]
        fn attempt_count_never_exceeds_max_attempts(max in 1i64..=10) {
            let rt = paused_runtime();
            let (job, log) = rt.block_on(async {
                let fx = Fixture::new(vec![TestHandler::always_fail(JobType::Import)]);
                let id = fx.submit(JobType::Import, max).await;
                fx.worker.process(id, &CancellationToken::new()).await.unwrap();
                (fx.job(id).await, fx.attempts(id).await)
            });

            prop_assert_eq!(job.status, JobStatus::Failed);
            prop_assert_eq!(job.attempt_count, max as u32);
            prop_assert!(job.attempt_count <= job.max_attempts);
            prop_assert_eq!(log.len(), max as usize);
        }

        /// Property: attempt numbers are exactly 1..=attempt_count whatever
        /// the mix of outcomes.
        #[test]
        fn attempt_numbers_are_contiguous(
            max in 1i64..=6,
            script in proptest::collection::vec(any::<bool>(), 0..8),
        ) {
            let rt = paused_runtime();
            let (job, log) = rt.block_on(async {
                let handler = TestHandler::new(JobType::Report, script.clone(), false);
                let fx = Fixture::new(vec![handler]);
                let id = fx.submit(JobType::Report, max).await;
                fx.worker.process(id, &CancellationToken::new()).await.unwrap();
                (fx.job(id).await, fx.attempts(id).await)
            });

            let expected: Vec<u32> = (1..=job.attempt_count).collect();
            prop_assert_eq!(attempt_numbers(&log), expected);
            prop_assert!(log.windows(2).all(|w| w[0].started_at <= w[1].started_at));

            let first_success = script.iter().take(max as usize).position(|ok| *ok);
            match first_success {
                Some(i) => {
                    prop_assert_eq!(job.status, JobStatus::Succeeded);
                    prop_assert_eq!(job.attempt_count, i as u32 + 1);
                }
                None => {
                    prop_assert_eq!(job.status, JobStatus::Failed);
                    prop_assert_eq!(job.attempt_count, max as u32);
                }
            }
            job.check_invariants().unwrap();
        }
    }
}
