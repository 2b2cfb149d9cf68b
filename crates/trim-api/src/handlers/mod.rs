//! Request handlers.

pub mod health;
pub mod trim;

pub use health::health;
pub use trim::{cancel_job, create_job, get_job};
