//! Object-store staging and publishing.
//!
//! This crate provides:
//! - The [`ObjectStore`] capability and its S3 implementation
//! - Per-job staging areas for remote inputs
//! - Publishing of finished outputs

pub mod client;
pub mod error;
pub mod publisher;
pub mod staging;
pub mod store;

pub use client::{S3Config, S3Store};
pub use error::{StorageError, StorageResult};
pub use publisher::{PublishError, Publisher};
pub use staging::{staged_file_name, StagingArea};
pub use store::{content_type_for, ObjectStore};
