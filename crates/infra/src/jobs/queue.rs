//! In-process work queue (job id hand-off between submission and workers).

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use jobforge_core::JobId;

/// Work queue abstraction.
///
/// - Unbounded: `enqueue` never waits for consumers
/// - Competing consumers: each id is delivered to exactly one `dequeue` caller
/// - FIFO per queue; no ordering across concurrent producers
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Hand a job id to the workers.
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError>;

    /// Wait for the next job id, or until `cancel` fires.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<JobId, QueueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed; no more ids will be accepted or delivered.
    #[error("work queue closed")]
    Closed,
    /// The caller's cancellation signal fired while waiting.
    #[error("dequeue cancelled")]
    Cancelled,
}

#[async_trait]
impl<Q> WorkQueue for std::sync::Arc<Q>
where
    Q: WorkQueue + ?Sized,
{
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        (**self).enqueue(job_id).await
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<JobId, QueueError> {
        (**self).dequeue(cancel).await
    }
}

/// Unbounded multi-producer/multi-consumer queue backed by a tokio channel.
///
/// Consumers share the single receiver behind an async mutex; whoever holds
/// the lock takes the next id, so an id can never be observed twice.
#[derive(Debug)]
pub struct InMemoryWorkQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<JobId>>,
    pending: AtomicUsize,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: AsyncMutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Stop accepting ids. Ids already queued are still delivered; after that
    /// `dequeue` reports [`QueueError::Closed`].
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Number of ids waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        let sender = self.sender.lock().map_err(|_| QueueError::Closed)?;
        match sender.as_ref() {
            Some(tx) => {
                // Count before sending so a fast consumer never underflows.
                self.pending.fetch_add(1, Ordering::AcqRel);
                tx.send(job_id).map_err(|_| {
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    QueueError::Closed
                })
            }
            None => Err(QueueError::Closed),
        }
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<JobId, QueueError> {
        // Both the lock acquisition and `recv` are cancel-safe: dropping
        // either future never loses a queued id.
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            rx = self.receiver.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            next = rx.recv() => {
                let job_id = next.ok_or(QueueError::Closed)?;
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Ok(job_id)
            }
        }
    }
}
