//! Shared data models for the trim service.
//!
//! This crate provides Serde-serializable types for:
//! - Edit decision lists (EDL) and cut segments
//! - Trim requests and their source/destination descriptors
//! - Job identifiers, states and snapshots
//! - Request validation errors

pub mod error;
pub mod job;
pub mod location;
pub mod request;
pub mod segment;

// Re-export common types
pub use error::{ValidationError, ValidationResult};
pub use job::{JobId, JobSnapshot, JobState, RenditionOutcome};
pub use location::{ObjectLocation, SourceDescriptor};
pub use request::{ResolvedRequest, TrimMode, TrimRequest};
pub use segment::{Edl, Segment};
