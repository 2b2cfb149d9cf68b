//! Trim job state machine.
//!
//! `Pending -> Running -> {Completed, Cancelled}`, plus `Pending -> Cancelled`
//! through [`TrimJob::cancel`]. Every transition happens while holding the
//! job's inner lock, and a terminal state is never left again. The state
//! itself lives in a `watch` channel so status reads never wait on the lock.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{warn, Instrument};
use trim_media::{Invocation, MediaTool, ProcessHandle};
use trim_models::{
    JobId, JobSnapshot, JobState, RenditionOutcome, ResolvedRequest, TrimRequest, ValidationError,
    ValidationResult,
};
use trim_storage::{Publisher, StagingArea};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::producer::{Production, ProductionContext, ProductionOutcome};

struct JobInner {
    request: Option<TrimRequest>,
    resolved: Option<ResolvedRequest>,
    processes: Vec<Arc<dyn ProcessHandle>>,
    produced_outputs: Vec<String>,
    renditions: Vec<RenditionOutcome>,
    failure: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// One trim request's lifecycle.
pub struct TrimJob {
    id: JobId,
    state: watch::Sender<JobState>,
    inner: Mutex<JobInner>,
}

impl Default for TrimJob {
    fn default() -> Self {
        Self::new()
    }
}

impl TrimJob {
    /// Create a pending job with a fresh id.
    pub fn new() -> Self {
        Self::with_id(JobId::new())
    }

    pub fn with_id(id: JobId) -> Self {
        let now = Utc::now();
        let (state, _) = watch::channel(JobState::Pending);

        Self {
            id,
            state,
            inner: Mutex::new(JobInner {
                request: None,
                resolved: None,
                processes: Vec::new(),
                produced_outputs: Vec::new(),
                renditions: Vec::new(),
                failure: None,
                created_at: now,
                updated_at: now,
                finished_at: None,
            }),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == JobState::Cancelled
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await.map(|s| *s);
        result.unwrap_or_else(|_| self.state())
    }

    /// Accept `request` and move to Running.
    ///
    /// Fails without touching the job if the request is invalid or the job
    /// has already been started.
    pub async fn trim(&self, request: TrimRequest) -> ValidationResult<()> {
        let mut inner = self.inner.lock().await;

        match self.state() {
            JobState::Pending => {}
            JobState::Running => return Err(ValidationError::AlreadyRunning),
            state => return Err(ValidationError::AlreadyFinished(state)),
        }

        let resolved = request.validate()?;
        inner.request = Some(request);
        inner.resolved = Some(resolved);
        inner.updated_at = Utc::now();
        self.state.send_replace(JobState::Running);
        Ok(())
    }

    /// Drive the accepted request to a terminal state.
    pub async fn run(&self, ctx: &ProcessingContext) {
        let (request, resolved) = {
            let inner = self.inner.lock().await;
            match (&inner.request, &inner.resolved) {
                (Some(request), Some(resolved)) => (request.clone(), resolved.clone()),
                _ => {
                    warn!(job_id = %self.id, "Run requested before a request was accepted");
                    return;
                }
            }
        };

        let production = Production::from(request.mode);
        let logger = JobLogger::new(&self.id, production.operation());
        let span = logger.span();

        async {
            if self.state() != JobState::Running {
                logger.skipped(self.state());
                return;
            }

            logger.started(
                request.sources.len(),
                request.edl.segments.len(),
                &resolved.destination,
            );

            let staging = StagingArea::new(&ctx.config.work_dir, self.id.as_str(), ctx.store.clone());
            let publisher = Publisher::new(ctx.store.clone());
            let production_ctx = ProductionContext {
                job: self,
                request: &request,
                resolved: &resolved,
                staging: &staging,
                publisher: &publisher,
                tool: ctx.tool.as_ref(),
                logger: &logger,
            };

            let outcome = production.produce(&production_ctx).await;
            let outputs = outcome.outputs.len();
            let state = self.finish(outcome).await;
            metrics::record_job_finished(request.mode, state);
            logger.finished(state, outputs);
        }
        .instrument(span)
        .await
    }

    /// Apply a production outcome. A job cancelled meanwhile stays cancelled.
    async fn finish(&self, outcome: ProductionOutcome) -> JobState {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        inner.produced_outputs = outcome.outputs;
        inner.renditions = outcome.renditions;
        inner.processes.clear();
        inner.updated_at = now;

        let target = outcome.state;
        let transitioned = self.state.send_if_modified(|state| {
            if *state == JobState::Running {
                *state = target;
                true
            } else {
                false
            }
        });

        if transitioned {
            inner.failure = outcome.failure;
            inner.finished_at = Some(now);
        }

        self.state()
    }

    /// Interrupt every owned process and mark the job Cancelled.
    ///
    /// Returns without waiting for the processes to exit. A terminal job is
    /// left as it is.
    pub async fn cancel(&self) -> JobState {
        let mut inner = self.inner.lock().await;

        let current = self.state();
        if current.is_terminal() {
            return current;
        }

        for handle in &inner.processes {
            if let Err(e) = handle.cancel() {
                warn!(job_id = %self.id, process = %handle.id(), error = %e, "Failed to interrupt process");
            }
        }

        let now = Utc::now();
        inner.updated_at = now;
        inner.finished_at = Some(now);
        self.state.send_replace(JobState::Cancelled);
        JobState::Cancelled
    }

    /// Track a freshly spawned process. If the job is already cancelled the
    /// process is interrupted instead.
    pub(crate) async fn register_process(&self, handle: Arc<dyn ProcessHandle>) {
        let mut inner = self.inner.lock().await;

        if self.is_cancelled() {
            if let Err(e) = handle.cancel() {
                warn!(job_id = %self.id, process = %handle.id(), error = %e, "Failed to interrupt process");
            }
            return;
        }

        inner.processes.push(handle);
    }

    pub(crate) async fn release_process(&self, handle: &Arc<dyn ProcessHandle>) {
        self.inner
            .lock()
            .await
            .processes
            .retain(|owned| !Arc::ptr_eq(owned, handle));
    }

    /// Spawn `invocation`, own its handle while it runs and wait for it.
    pub(crate) async fn execute(
        &self,
        tool: &dyn MediaTool,
        invocation: &Invocation,
    ) -> WorkerResult<()> {
        if self.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        let started = Instant::now();
        let spawned = tool.spawn(invocation).await?;
        self.register_process(Arc::clone(&spawned.handle)).await;

        let result = spawned.exit.await;
        self.release_process(&spawned.handle).await;
        metrics::record_ffmpeg_duration(result.is_ok(), started.elapsed().as_secs_f64());
        result?;

        // Cancelled jobs never publish
        if self.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.lock().await;

        JobSnapshot {
            id: self.id.clone(),
            request: inner.request.clone(),
            state: self.state(),
            produced_outputs: inner.produced_outputs.clone(),
            renditions: inner.renditions.clone(),
            failure: inner.failure.clone(),
            created_at: inner.created_at,
            updated_at: inner.updated_at,
        }
    }

    /// When the job reached its terminal state.
    pub async fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.finished_at
    }

    /// Number of processes currently owned.
    pub async fn process_count(&self) -> usize {
        self.inner.lock().await.processes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, wait_for_processes, MemoryStore, ScriptedTool, ToolBehavior};
    use std::path::Path;
    use trim_models::{Edl, Segment, TrimMode};

    fn clip_request(sources: Vec<&str>, mode: TrimMode) -> TrimRequest {
        TrimRequest::new(
            sources.into_iter().map(String::from).collect(),
            mode,
            "s3://out/dir",
            Edl::new("clip", vec![Segment::new(0.0, 5.0), Segment::new(10.0, 12.0)]),
        )
    }

    fn filter_graph(invocation: &Invocation) -> &str {
        let pos = invocation
            .args
            .iter()
            .position(|a| a == "-filter_complex")
            .unwrap();
        &invocation.args[pos + 1]
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_pending() {
        let job = TrimJob::new();

        let mut request = clip_request(vec![], TrimMode::Single);
        assert_eq!(job.trim(request.clone()).await, Err(ValidationError::NoSources));

        request.sources = vec!["s3://b/a.mp4".to_string()];
        request.edl.segments.clear();
        assert_eq!(job.trim(request.clone()).await, Err(ValidationError::NoSegments));

        let mut request = clip_request(vec!["s3://b/a.mp4"], TrimMode::Single);
        request.destination = String::new();
        assert_eq!(job.trim(request).await, Err(ValidationError::NoDestination));

        assert_eq!(job.state(), JobState::Pending);
        assert!(job.snapshot().await.request.is_none());
    }

    #[tokio::test]
    async fn test_second_trim_rejected() {
        let job = TrimJob::new();
        let first = clip_request(vec!["s3://b/a.mp4"], TrimMode::Single);
        job.trim(first.clone()).await.unwrap();
        assert_eq!(job.state(), JobState::Running);

        let second = clip_request(vec!["s3://b/other.mp4"], TrimMode::MultiRendition);
        assert_eq!(job.trim(second).await, Err(ValidationError::AlreadyRunning));
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.snapshot().await.request, Some(first));
    }

    #[tokio::test]
    async fn test_trim_after_cancel_rejected() {
        let job = TrimJob::new();
        assert_eq!(job.cancel().await, JobState::Cancelled);

        let result = job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single)).await;
        assert_eq!(result, Err(ValidationError::AlreadyFinished(JobState::Cancelled)));
        assert_eq!(job.state(), JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_single_example() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store.clone(), tool.clone());

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.produced_outputs, vec!["s3://out/dir/clip.mp4"]);
        assert!(snapshot.failure.is_none());

        let invocations = tool.invocations().await;
        assert_eq!(invocations.len(), 1);
        let graph = filter_graph(&invocations[0]);
        assert_eq!(graph.matches("[0:v]trim=").count(), 2);
        assert_eq!(graph.matches("[0:a]atrim=").count(), 2);
        assert!(graph.ends_with("[v0_0][a0_0][v1_0][a1_0]concat=n=2:v=1:a=1[outv][outa]"));

        assert_eq!(store.object("out", "dir/clip.mp4").await, Some(b"trimmed".to_vec()));
        assert!(!dir.path().join(job.id().as_str()).exists());
        assert_eq!(job.process_count().await, 0);
    }

    fn input_args(invocation: &Invocation) -> Vec<&str> {
        invocation
            .args
            .windows(2)
            .filter(|pair| pair[0] == "-i")
            .map(|pair| pair[1].as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_source_named_like_output_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("src", "clip.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store.clone(), tool.clone());

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://src/clip.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Completed, "{:?}", snapshot.failure);
        assert_eq!(snapshot.produced_outputs, vec!["s3://out/dir/clip.mp4"]);

        let invocations = tool.invocations().await;
        let job_dir = dir.path().join(job.id().as_str());
        let inputs = input_args(&invocations[0]);
        assert_eq!(inputs.len(), 1);
        assert!(Path::new(inputs[0]).starts_with(job_dir.join("inputs")));
        assert!(invocations[0].output.starts_with(job_dir.join("outputs")));
        assert_ne!(Path::new(inputs[0]), invocations[0].output);
    }

    #[tokio::test]
    async fn test_rendition_source_named_like_output_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("src", "clip_0.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store, tool);

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://src/clip_0.mp4"], TrimMode::MultiRendition))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.produced_outputs, vec!["s3://out/dir/clip_0.mp4"]);
        assert!(snapshot.renditions[0].is_success());
    }

    #[tokio::test]
    async fn test_sources_sharing_a_key_are_staged_separately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("b1", "a.mp4", "first")
                .with_object("b2", "a.mp4", "second"),
        );
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store, tool.clone());

        let job = TrimJob::new();
        job.trim(clip_request(
            vec!["s3://b1/a.mp4", "s3://b2/a.mp4", "s3://b1/a.mp4"],
            TrimMode::Single,
        ))
        .await
        .unwrap();
        job.run(&ctx).await;

        assert_eq!(job.state(), JobState::Completed);
        let invocations = tool.invocations().await;
        let inputs = input_args(&invocations[0]);
        assert_eq!(inputs.len(), 3);
        assert_ne!(inputs[0], inputs[1]);
        assert_ne!(inputs[0], inputs[2]);
        assert_ne!(inputs[1], inputs[2]);
    }

    #[tokio::test]
    async fn test_single_fetch_failure_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store, tool.clone());

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://b/a.mp4", "s3://b/missing.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert!(snapshot.failure.unwrap().contains("s3://b/missing.mp4"));
        assert!(tool.invocations().await.is_empty());
        assert!(!dir.path().join(job.id().as_str()).exists());
    }

    #[tokio::test]
    async fn test_single_process_failure_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Fail));
        let ctx = context(dir.path(), store.clone(), tool);

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert!(snapshot.produced_outputs.is_empty());
        assert!(snapshot.failure.unwrap().contains("FFmpeg"));
        assert_eq!(store.uploaded_keys().await, vec!["s3://b/a.mp4"]);
    }

    #[tokio::test]
    async fn test_single_cleanup_failure_cancels_with_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("b", "a.mp4", "source")
                .remove_after_upload(),
        );
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store.clone(), tool);

        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert!(snapshot.produced_outputs.is_empty());
        assert!(snapshot.failure.unwrap().contains("s3://out/dir/clip.mp4"));
        assert!(store.object("out", "dir/clip.mp4").await.is_some());
    }

    #[tokio::test]
    async fn test_multi_rendition_partial_publish() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("b", "a.mp4", "a")
                .with_object("b", "b.mp4", "b")
                .with_object("b", "c.mp4", "c")
                .fail_upload("clip_1.mp4"),
        );
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let ctx = context(dir.path(), store, tool.clone());

        let job = TrimJob::new();
        job.trim(clip_request(
            vec!["s3://b/a.mp4", "s3://b/b.mp4", "s3://b/c.mp4"],
            TrimMode::MultiRendition,
        ))
        .await
        .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(
            snapshot.produced_outputs,
            vec!["s3://out/dir/clip_0.mp4", "s3://out/dir/clip_2.mp4"]
        );
        assert_eq!(snapshot.renditions.len(), 3);
        assert!(snapshot.renditions[0].is_success());
        assert_eq!(snapshot.renditions[1].source, "s3://b/b.mp4");
        assert!(snapshot.renditions[1].error.as_ref().unwrap().contains("access denied"));
        assert!(snapshot.renditions[2].is_success());

        let invocations = tool.invocations().await;
        assert_eq!(invocations.len(), 3);
        for invocation in &invocations {
            assert_eq!(invocation.args.iter().filter(|a| *a == "-i").count(), 1);
            assert!(filter_graph(invocation).ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
        }
        assert!(!dir.path().join(job.id().as_str()).exists());
    }

    #[tokio::test]
    async fn test_multi_rendition_tolerates_fetch_and_process_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("b", "a.mp4", "a")
                .with_object("b", "c.mp4", "c")
                .fail_download("a.mp4"),
        );
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed).fail_input("c.mp4"));
        let ctx = context(dir.path(), store, tool);

        let job = TrimJob::new();
        job.trim(clip_request(
            vec!["s3://b/a.mp4", "/media/local.mp4", "s3://b/c.mp4"],
            TrimMode::MultiRendition,
        ))
        .await
        .unwrap();
        job.run(&ctx).await;

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.produced_outputs, vec!["s3://out/dir/clip_1.mp4"]);
        assert!(snapshot.renditions[0].error.as_ref().unwrap().contains("connection reset"));
        assert!(!snapshot.renditions[2].is_success());
        assert!(snapshot.failure.is_none());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::HangUntilCancelled));
        let ctx = context(dir.path(), store.clone(), tool.clone());

        let job = Arc::new(TrimJob::new());
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();

        let runner = {
            let job = job.clone();
            tokio::spawn(async move { job.run(&ctx).await })
        };

        assert!(wait_for_processes(&job, 1).await);
        assert_eq!(job.cancel().await, JobState::Cancelled);
        assert_eq!(job.state(), JobState::Cancelled);

        runner.await.unwrap();
        assert_eq!(tool.cancel_count().await, 1);

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert!(snapshot.produced_outputs.is_empty());
        assert!(snapshot.failure.is_none());
        assert!(store.object("out", "dir/clip.mp4").await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_does_not_wait_for_exit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::IgnoreCancel));
        let ctx = context(dir.path(), store, tool.clone());

        let job = Arc::new(TrimJob::new());
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();

        let runner = {
            let job = job.clone();
            tokio::spawn(async move { job.run(&ctx).await })
        };

        assert!(wait_for_processes(&job, 1).await);
        assert_eq!(job.cancel().await, JobState::Cancelled);
        assert_eq!(job.state(), JobState::Cancelled);
        assert!(!runner.is_finished());
        assert_eq!(tool.cancel_count().await, 1);

        runner.abort();
    }

    #[tokio::test]
    async fn test_process_registered_after_cancel_is_interrupted() {
        let job = TrimJob::new();
        job.trim(clip_request(vec!["s3://b/a.mp4"], TrimMode::Single))
            .await
            .unwrap();
        job.cancel().await;

        let tool = ScriptedTool::new(ToolBehavior::HangUntilCancelled);
        let invocation = trim_media::FfmpegCommand::new("/tmp/x.mp4").into_invocation();
        let spawned = tool.spawn(&invocation).await.unwrap();
        job.register_process(Arc::clone(&spawned.handle)).await;

        assert_eq!(job.process_count().await, 0);
        assert_eq!(tool.cancel_count().await, 1);
        assert!(spawned.exit.await.is_err());

        // And the job refuses to spawn anything new
        let result = job.execute(&tool, &invocation).await;
        assert!(matches!(result, Err(WorkerError::Cancelled)));
        assert_eq!(tool.invocations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_terminal() {
        let job = Arc::new(TrimJob::new());
        let waiter = {
            let job = job.clone();
            tokio::spawn(async move { job.wait_terminal().await })
        };
        job.cancel().await;
        assert_eq!(waiter.await.unwrap(), JobState::Cancelled);
        assert!(job.finished_at().await.is_some());
    }
}
