//! Running invocations as owned, cancellable processes.
//!
//! [`MediaTool`] is the capability the job layer drives. A spawned process is
//! split into a [`ProcessHandle`] (shared, used for cancellation) and an exit
//! future the caller awaits. Backends other than a local FFmpeg binary only
//! need to implement these two traits.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::Invocation;
use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Number of diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Owned handle to a running process.
pub trait ProcessHandle: Send + Sync + fmt::Debug {
    /// Backend-specific identifier (pid for local processes).
    fn id(&self) -> String;

    /// Ask the process to stop. Advisory: returns once the request is sent.
    fn cancel(&self) -> MediaResult<()>;
}

/// A started process: its handle plus a future resolving when it exits.
pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,
    pub exit: BoxFuture<'static, MediaResult<()>>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// External media tool capability.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn spawn(&self, invocation: &Invocation) -> MediaResult<SpawnedProcess>;
}

/// Local FFmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    binary: PathBuf,
}

impl FfmpegTool {
    /// Use `binary` as given, without looking it up.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve `binary` (a name or a path) to an executable.
    pub fn resolve(binary: &str) -> MediaResult<Self> {
        which::which(binary)
            .map(Self::new)
            .map_err(|e| MediaError::FfmpegNotFound(format!("{}: {}", binary, e)))
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn spawn(&self, invocation: &Invocation) -> MediaResult<SpawnedProcess> {
        debug!(
            "Running FFmpeg: {} {}",
            self.binary.display(),
            invocation.command_line()
        );

        let mut child = Command::new(&self.binary)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::SpawnFailed(e.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| MediaError::internal("FFmpeg exited before its pid was read"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let handle = Arc::new(FfmpegHandle::new(pid));
        let exited = Arc::clone(&handle.exited);
        let output = invocation.output.clone();
        let expected_ms = invocation.expected_duration_ms;

        let exit = async move {
            // Progress and diagnostics both arrive on stderr
            let reader_task = tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut current = FfmpegProgress::default();
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

                while let Ok(Some(line)) = lines.next_line().await {
                    if is_progress_line(&line) {
                        if let Some(progress) = parse_progress_line(&line, &mut current) {
                            debug!(
                                pid,
                                frame = progress.frame,
                                out_time_ms = progress.out_time_ms,
                                speed = progress.speed,
                                percent = expected_ms.map(|ms| progress.percentage(ms)),
                                "FFmpeg progress"
                            );
                        }
                    } else {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }

                tail.into_iter().collect::<Vec<_>>().join("\n")
            });

            let status = child.wait().await;
            exited.store(true, Ordering::SeqCst);
            let status = status?;
            let stderr = reader_task.await.unwrap_or_default();

            if status.success() {
                info!(pid, output = %output.display(), "FFmpeg finished");
                Ok(())
            } else {
                Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with non-zero status",
                    (!stderr.is_empty()).then_some(stderr),
                    status.code(),
                ))
            }
        }
        .boxed();

        Ok(SpawnedProcess { handle, exit })
    }
}

/// Handle to a local FFmpeg process; cancels with SIGINT.
#[derive(Debug)]
pub struct FfmpegHandle {
    pid: u32,
    exited: Arc<AtomicBool>,
}

impl FfmpegHandle {
    fn new(pid: u32) -> Self {
        Self {
            pid,
            exited: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ProcessHandle for FfmpegHandle {
    fn id(&self) -> String {
        self.pid.to_string()
    }

    fn cancel(&self) -> MediaResult<()> {
        // Reaped pids may be reused
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }

        let raw = i32::try_from(self.pid)
            .map_err(|_| MediaError::signal_failed(self.id(), "pid out of range"))?;

        match kill(Pid::from_raw(raw), Signal::SIGINT) {
            Ok(()) => {
                info!(pid = self.pid, "Sent SIGINT to FFmpeg");
                Ok(())
            }
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Failed to signal FFmpeg");
                Err(MediaError::signal_failed(self.id(), e.to_string()))
            }
        }
    }
}

/// `key=value` lines with a bare identifier key are progress output.
fn is_progress_line(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => {
            !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FfmpegCommand;

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("out_time_us=1000"));
        assert!(is_progress_line("progress=end"));
        assert!(!is_progress_line("[in#0 @ 0x1] Error opening input: No such file"));
        assert!(!is_progress_line("Conversion failed!"));
    }

    #[test]
    fn test_resolve_missing_binary() {
        let result = FfmpegTool::resolve("definitely-not-a-real-ffmpeg-binary");
        assert!(matches!(result, Err(MediaError::FfmpegNotFound(_))));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let tool = FfmpegTool::new("/nonexistent/ffmpeg");
        let inv = FfmpegCommand::new("/tmp/out.mp4").input("in.mp4").into_invocation();
        let result = tool.spawn(&inv).await;
        assert!(matches!(result, Err(MediaError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_process() {
        // `sleep` stands in for a long-running encoder; it ignores the args
        // shape but honours SIGINT.
        let tool = FfmpegTool::new("sleep");
        let inv = Invocation {
            args: vec!["30".to_string()],
            output: PathBuf::from("/tmp/unused.mp4"),
            expected_duration_ms: None,
        };
        let spawned = tool.spawn(&inv).await.unwrap();
        assert!(!spawned.handle.id().is_empty());

        spawned.handle.cancel().unwrap();
        let result = spawned.exit.await;
        assert!(matches!(result, Err(MediaError::FfmpegFailed { .. })));

        // Cancelling an exited process is a no-op
        assert!(spawned.handle.cancel().is_ok());
    }
}
