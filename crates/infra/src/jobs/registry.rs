//! Handler registry: job type → handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use jobforge_core::{Job, JobType};

/// Executable logic for one job type.
///
/// Implementations should watch `cancel` during long waits and return an
/// error once it fires. A handler that ignores it can hold up shutdown.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler serves.
    fn job_type(&self) -> JobType;

    /// Execute one attempt. An `Err` counts as a failed attempt; its
    /// `Display` text is what gets recorded.
    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered for job type {0}")]
    Duplicate(JobType),
}

/// Explicit type → handler mapping, built once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared type.
    pub fn register<H>(&mut self, handler: H) -> Result<(), RegistryError>
    where
        H: JobHandler + 'static,
    {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn JobHandler>) -> Result<(), RegistryError> {
        let job_type = handler.job_type();
        if self.handlers.contains_key(&job_type) {
            return Err(RegistryError::Duplicate(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with<H>(mut self, handler: H) -> Result<Self, RegistryError>
    where
        H: JobHandler + 'static,
    {
        self.register(handler)?;
        Ok(self)
    }

    pub fn resolve(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
