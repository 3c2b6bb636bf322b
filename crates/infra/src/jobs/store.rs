//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use jobforge_core::{AttemptRecord, Job, JobId};

/// Job store abstraction (repository contract).
///
/// The store is the single source of truth for job state. Workers write back
/// every mutation through it before moving on, so every method may suspend
/// and every method can fail with [`JobStoreError::Storage`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn create(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Overwrite the mutable fields of an existing job (idempotent).
    async fn save(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Record a newly opened attempt.
    ///
    /// Attempt numbers must be contiguous per job: the record must carry
    /// `last_attempt_number + 1`.
    async fn append_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError>;

    /// Overwrite an existing attempt (used to close it).
    async fn update_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError>;

    /// Most recently created jobs first.
    async fn list_recent(&self, take: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Attempts for a job in ascending attempt-number order.
    async fn list_attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("attempt {attempt} of job {job_id} not found")]
    AttemptNotFound { job_id: JobId, attempt: u32 },
    #[error("attempt {found} of job {job_id} out of order (expected {expected})")]
    AttemptOutOfOrder {
        job_id: JobId,
        expected: u32,
        found: u32,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

#[async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).create(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id).await
    }

    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).save(job).await
    }

    async fn append_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        (**self).append_attempt(record).await
    }

    async fn update_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        (**self).update_attempt(record).await
    }

    async fn list_recent(&self, take: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_recent(take).await
    }

    async fn list_attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError> {
        (**self).list_attempts(job_id).await
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    attempts: RwLock<HashMap<JobId, Vec<AttemptRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::storage("lock poisoned")
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    async fn append_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        if !self.jobs.read().map_err(poisoned)?.contains_key(&record.job_id) {
            return Err(JobStoreError::NotFound(record.job_id));
        }

        let mut attempts = self.attempts.write().map_err(poisoned)?;
        let log = attempts.entry(record.job_id).or_default();

        let expected = log.last().map(|r| r.attempt_number).unwrap_or(0) + 1;
        if record.attempt_number != expected {
            return Err(JobStoreError::AttemptOutOfOrder {
                job_id: record.job_id,
                expected,
                found: record.attempt_number,
            });
        }

        log.push(record.clone());
        Ok(())
    }

    async fn update_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        let mut attempts = self.attempts.write().map_err(poisoned)?;
        let stored = attempts
            .get_mut(&record.job_id)
            .and_then(|log| {
                log.iter_mut()
                    .find(|r| r.attempt_number == record.attempt_number)
            })
            .ok_or(JobStoreError::AttemptNotFound {
                job_id: record.job_id,
                attempt: record.attempt_number,
            })?;

        *stored = record.clone();
        Ok(())
    }

    async fn list_recent(&self, take: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs.values().cloned().collect();

        // UUIDv7 ids break ties between jobs created in the same instant.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(take);
        Ok(result)
    }

    async fn list_attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError> {
        let attempts = self.attempts.read().map_err(poisoned)?;
        Ok(attempts.get(&job_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobforge_core::{JobStatus, JobType};

    fn job() -> Job {
        Job::new(JobType::Report, r#"{"k":1}"#, None)
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(store.get(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();

        assert_eq!(
            store.create(&job).await.unwrap_err(),
            JobStoreError::AlreadyExists(job.id)
        );
    }

    #[tokio::test]
    async fn save_is_idempotent_upsert_of_existing_rows() {
        let store = InMemoryJobStore::new();
        let mut job = job();
        store.create(&job).await.unwrap();

        job.start(Utc::now()).unwrap();
        store.save(&job).await.unwrap();
        store.save(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);

        let unknown = self::job();
        assert_eq!(
            store.save(&unknown).await.unwrap_err(),
            JobStoreError::NotFound(unknown.id)
        );
    }

    #[tokio::test]
    async fn attempts_must_be_contiguous() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();
        let now = Utc::now();

        store
            .append_attempt(&AttemptRecord::open(job.id, 1, now))
            .await
            .unwrap();

        let dup = store
            .append_attempt(&AttemptRecord::open(job.id, 1, now))
            .await
            .unwrap_err();
        assert_eq!(
            dup,
            JobStoreError::AttemptOutOfOrder {
                job_id: job.id,
                expected: 2,
                found: 1
            }
        );

        let gap = store
            .append_attempt(&AttemptRecord::open(job.id, 3, now))
            .await
            .unwrap_err();
        assert!(matches!(gap, JobStoreError::AttemptOutOfOrder { expected: 2, .. }));
    }

    #[tokio::test]
    async fn attempts_require_an_existing_job() {
        let store = InMemoryJobStore::new();
        let orphan = AttemptRecord::open(JobId::new(), 1, Utc::now());
        assert!(matches!(
            store.append_attempt(&orphan).await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_attempt_closes_record() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();

        let now = Utc::now();
        let mut rec = AttemptRecord::open(job.id, 1, now);
        store.append_attempt(&rec).await.unwrap();
        rec.fail("boom", now).unwrap();
        store.update_attempt(&rec).await.unwrap();

        let log = store.list_attempts(job.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].error.as_deref(), Some("boom"));
        assert!(!log[0].is_in_flight());

        let missing = AttemptRecord::open(job.id, 7, now);
        assert_eq!(
            store.update_attempt(&missing).await.unwrap_err(),
            JobStoreError::AttemptNotFound {
                job_id: job.id,
                attempt: 7
            }
        );
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_bounded() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut job = job();
            job.created_at = Utc::now() + chrono::Duration::seconds(i);
            ids.push(job.id);
            store.create(&job).await.unwrap();
        }

        let recent = store.list_recent(3).await.unwrap();
        let got: Vec<_> = recent.iter().map(|j| j.id).collect();
        assert_eq!(got, vec![ids[4], ids[3], ids[2]]);
    }

    #[tokio::test]
    async fn arc_store_delegates() {
        let store: Arc<dyn JobStore> = InMemoryJobStore::arc();
        let job = job();
        store.create(&job).await.unwrap();
        assert!(store.get(job.id).await.unwrap().is_some());
    }
}
