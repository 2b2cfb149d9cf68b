//! FFmpeg invocation building and process control.
//!
//! This crate provides:
//! - EDL to filter-graph translation for single and multi-rendition output
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Owned, cancellable process handles behind the [`MediaTool`] capability

pub mod command;
pub mod edl;
pub mod error;
pub mod filters;
pub mod process;
pub mod progress;

pub use command::{FfmpegCommand, Invocation};
pub use edl::{
    build_invocations, build_rendition_invocation, build_single_invocation, rendition_output_name,
    single_output_name,
};
pub use error::{MediaError, MediaResult};
pub use process::{FfmpegTool, MediaTool, ProcessHandle, SpawnedProcess};
pub use progress::FfmpegProgress;
