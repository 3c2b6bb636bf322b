//! `jobforge-core` — job domain building blocks.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! identifiers, the job lifecycle state machine and attempt records.

pub mod attempt;
pub mod error;
pub mod id;
pub mod job;

pub use attempt::AttemptRecord;
pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{
    DEFAULT_MAX_ATTEMPTS, Job, JobStatus, JobType, MAX_ERROR_LEN, MAX_PAYLOAD_LEN,
    truncate_message,
};
