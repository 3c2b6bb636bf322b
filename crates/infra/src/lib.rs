//! Infrastructure layer: job store, work queue, workers, configuration.

pub mod config;
pub mod jobs;

pub use config::{AppConfig, ConfigError};
