//! Trim job execution.
//!
//! This crate provides:
//! - The trim job state machine and its process ownership
//! - Single and multi-rendition production strategies
//! - The job registry with retention-based eviction
//! - Worker configuration and structured job logging

pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod producer;
pub mod registry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use job::TrimJob;
pub use logging::JobLogger;
pub use producer::{Production, ProductionOutcome};
pub use registry::JobRegistry;
