//! Job model and lifecycle state machine.
//!
//! ```text
//! Queued ──start──► Running ──succeed──► Succeeded
//!                      │
//!                      └──────fail─────► Failed
//! ```
//!
//! `Succeeded` and `Failed` are terminal. Every transition stamps the
//! timestamps it owns, so the invariants below hold after any sequence of
//! successful calls:
//!
//! - `0 <= attempt_count <= max_attempts`
//! - `started_at` is set iff the job has left `Queued`
//! - `completed_at` is set iff the job is terminal

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Attempt budget used when a submission does not ask for a positive one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for a job payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 2048;

/// Upper bound for persisted error messages, in characters.
pub const MAX_ERROR_LEN: usize = 2048;

/// Job type tag used to select a handler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Import,
    Report,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Import => "import",
            JobType::Report => "report",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "import" => Ok(JobType::Import),
            "report" => Ok(JobType::Report),
            other => Err(DomainError::validation(format!("unknown job type: {other}"))),
        }
    }
}

/// Job lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for a worker
    Queued,
    /// Claimed by a worker; attempts may be in progress
    Running,
    /// An attempt succeeded
    Succeeded,
    /// Attempts exhausted, no handler, or an internal fault
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Truncate a message to at most `max` characters (never splits a code point).
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// A submitted unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Opaque serialized payload; never interpreted by the engine.
    pub payload: String,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    /// Create a queued job.
    ///
    /// A missing or non-positive `max_attempts` falls back to
    /// [`DEFAULT_MAX_ATTEMPTS`] instead of being rejected.
    pub fn new(job_type: JobType, payload: impl Into<String>, max_attempts: Option<i64>) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload: payload.into(),
            status: JobStatus::Queued,
            attempt_count: 0,
            max_attempts: Self::normalize_max_attempts(max_attempts),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    pub fn normalize_max_attempts(requested: Option<i64>) -> u32 {
        match requested {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    fn transition(&mut self, next: JobStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// `Queued -> Running`; stamps `started_at` once.
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobStatus::Running)?;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(())
    }

    /// Reserve the next attempt and return its 1-based number.
    ///
    /// Fails without mutating anything if the job is not running or the
    /// attempt budget is already used up.
    pub fn begin_attempt(&mut self) -> DomainResult<u32> {
        if self.status != JobStatus::Running {
            return Err(DomainError::invariant(format!(
                "attempt started while job is {}",
                self.status
            )));
        }
        if self.attempt_count >= self.max_attempts {
            return Err(DomainError::invariant(format!(
                "attempt limit exceeded: attempt_count={}, max_attempts={}",
                self.attempt_count, self.max_attempts
            )));
        }
        self.attempt_count += 1;
        Ok(self.attempt_count)
    }

    /// `Running -> Succeeded`; clears `last_error`.
    pub fn succeed(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobStatus::Succeeded)?;
        self.last_error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `Running -> Failed`; records the (truncated) reason.
    pub fn fail(&mut self, error: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(JobStatus::Failed)?;
        self.last_error = Some(truncate_message(error, MAX_ERROR_LEN));
        self.completed_at = Some(now);
        Ok(())
    }

    /// Verify the structural invariants of the record.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.max_attempts == 0 {
            return Err(DomainError::invariant("max_attempts must be positive"));
        }
        if self.attempt_count > self.max_attempts {
            return Err(DomainError::invariant(format!(
                "attempt_count {} exceeds max_attempts {}",
                self.attempt_count, self.max_attempts
            )));
        }
        let left_queued = self.status != JobStatus::Queued;
        if left_queued != self.started_at.is_some() {
            return Err(DomainError::invariant(format!(
                "started_at inconsistent with status {}",
                self.status
            )));
        }
        if self.is_terminal() != self.completed_at.is_some() {
            return Err(DomainError::invariant(format!(
                "completed_at inconsistent with status {}",
                self.status
            )));
        }
        Ok(())
    }
}
