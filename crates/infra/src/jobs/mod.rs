//! Job execution engine: queue hand-off, retry with capped exponential
//! backoff, and durable attempt history.
//!
//! ## Components
//!
//! - `JobStore`: persistence for jobs and their attempt log (in-memory or Postgres)
//! - `WorkQueue`: in-process hand-off of job ids to competing workers
//! - `HandlerRegistry`: job type → handler
//! - `RetryController`: attempt budget and backoff for one job
//! - `JobWorker` / `WorkerPool`: the pull/process loops
//! - `JobSubmitter`: create-then-enqueue entry point

pub mod attempt;
pub mod handlers;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod store;
pub mod submit;
pub mod worker;

pub use attempt::{AttemptOutcome, execute_attempt};
pub use handlers::{ImportJobHandler, ReportJobHandler, default_registry};
#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;
pub use queue::{InMemoryWorkQueue, QueueError, WorkQueue};
pub use registry::{HandlerRegistry, JobHandler, RegistryError};
pub use retry::{RetryController, RetryOutcome, RetryPolicy, backoff_delay};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use submit::{JobSubmitter, SubmitError, SubmitJob};
pub use worker::{JobOutcome, JobWorker, WorkerError, WorkerPool, WorkerPoolHandle, WorkerStats};
