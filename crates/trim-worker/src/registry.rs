//! Job registry.
//!
//! Creates jobs, indexes them by id and routes status and cancel requests.
//! Finished jobs are evicted once they are older than the configured
//! retention, and when a cap is set the oldest finished jobs go first.
//! Pending and running jobs are never evicted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use trim_models::{JobId, JobSnapshot, JobState, TrimRequest, ValidationResult};

use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::job::TrimJob;
use crate::metrics;

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<TrimJob>>>,
    ctx: Arc<ProcessingContext>,
}

impl JobRegistry {
    pub fn new(ctx: ProcessingContext) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ctx: Arc::new(ctx),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.ctx.config
    }

    /// Validate `request`, start a job for it and return the job id.
    ///
    /// Processing runs on its own task; this returns as soon as the job is
    /// indexed. An invalid request is rejected and nothing is indexed.
    pub async fn create_job(&self, request: TrimRequest) -> ValidationResult<JobId> {
        let job = Arc::new(TrimJob::new());
        let mode = request.mode;
        job.trim(request).await?;

        let id = job.id().clone();
        self.jobs.write().await.insert(id.clone(), Arc::clone(&job));
        metrics::record_job_created(mode);
        info!(job_id = %id, mode = mode.as_str(), "Created trim job");

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            job.run(&ctx).await;
        });

        Ok(id)
    }

    /// Look up a job by id.
    pub async fn job(&self, id: &JobId) -> Option<Arc<TrimJob>> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn get_job(&self, id: &JobId) -> Option<JobSnapshot> {
        let job = self.job(id).await?;
        Some(job.snapshot().await)
    }

    pub async fn get_status(&self, id: &JobId) -> Option<JobState> {
        self.job(id).await.map(|job| job.state())
    }

    /// Cancel a job; already finished jobs keep their state.
    pub async fn cancel(&self, id: &JobId) -> Option<JobState> {
        let job = self.job(id).await?;
        let state = job.cancel().await;
        info!(job_id = %id, state = %state, "Cancel requested");
        Some(state)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drop finished jobs past retention, then enforce the cap.
    ///
    /// Returns the number of jobs removed.
    pub async fn evict_expired(&self) -> usize {
        let retention = self.ctx.config.job_retention;
        let now = chrono::Utc::now();

        let mut jobs = self.jobs.write().await;

        let mut finished = Vec::new();
        for (id, job) in jobs.iter() {
            if !job.state().is_terminal() {
                continue;
            }
            if let Some(at) = job.finished_at().await {
                finished.push((at, id.clone()));
            }
        }
        finished.sort_by_key(|(at, _)| *at);

        let mut evicted = 0;
        let mut remaining = Vec::new();
        for (at, id) in finished {
            let expired = (now - at)
                .to_std()
                .map(|age| age >= retention)
                .unwrap_or(false);
            if expired {
                jobs.remove(&id);
                evicted += 1;
            } else {
                remaining.push(id);
            }
        }

        if let Some(cap) = self.ctx.config.max_retained_jobs {
            // `remaining` is oldest first
            for id in remaining {
                if jobs.len() <= cap {
                    break;
                }
                jobs.remove(&id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            metrics::record_jobs_evicted(evicted);
            debug!(evicted, retained = jobs.len(), "Evicted finished jobs");
        }
        evicted
    }

    /// Run [`Self::evict_expired`] every `eviction_interval` until `shutdown` flips.
    pub async fn run_eviction_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.ctx.config.eviction_interval);
        info!(
            interval_secs = self.ctx.config.eviction_interval.as_secs(),
            "Starting job eviction loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_expired().await;
                    if evicted > 0 {
                        info!(evicted, "Evicted expired jobs");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Stopping job eviction loop");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use crate::testing::{context, wait_for_processes, MemoryStore, ScriptedTool, ToolBehavior};
    use trim_models::{Edl, Segment, TrimMode, ValidationError};

    fn request(source: &str) -> TrimRequest {
        TrimRequest::new(
            vec![source.to_string()],
            TrimMode::Single,
            "s3://out/dir",
            Edl::new("clip", vec![Segment::new(0.0, 5.0), Segment::new(10.0, 12.0)]),
        )
    }

    fn registry(dir: &std::path::Path, behavior: ToolBehavior) -> JobRegistry {
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(behavior));
        JobRegistry::new(context(dir, store, tool))
    }

    async fn finish(registry: &JobRegistry, id: &JobId) -> JobState {
        registry.job(id).await.unwrap().wait_terminal().await
    }

    #[tokio::test]
    async fn test_create_job_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::Succeed);

        let id = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
        assert_eq!(finish(&registry, &id).await, JobState::Completed);

        let snapshot = registry.get_job(&id).await.unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.produced_outputs, vec!["s3://out/dir/clip.mp4"]);
        assert_eq!(snapshot.request.unwrap().edl.name, "clip");
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::Succeed);

        let mut bad = request("s3://b/a.mp4");
        bad.destination = String::new();
        assert_eq!(registry.create_job(bad).await, Err(ValidationError::NoDestination));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::Succeed);

        let mut ids = HashSet::new();
        for _ in 0..5 {
            ids.insert(registry.create_job(request("s3://b/a.mp4")).await.unwrap());
        }
        assert_eq!(ids.len(), 5);
        assert_eq!(registry.len().await, 5);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::Succeed);
        let id = JobId::from("nope");

        assert!(registry.get_job(&id).await.is_none());
        assert!(registry.get_status(&id).await.is_none());
        assert!(registry.cancel(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_status_is_stable_and_cancel_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::IgnoreCancel);

        let id = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
        let job = registry.job(&id).await.unwrap();
        assert!(wait_for_processes(&job, 1).await);

        let first = registry.get_status(&id).await;
        let second = registry.get_status(&id).await;
        assert_eq!(first, Some(JobState::Running));
        assert_eq!(first, second);

        assert_eq!(registry.cancel(&id).await, Some(JobState::Cancelled));
        assert_eq!(registry.get_status(&id).await, Some(JobState::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_finished_job_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), ToolBehavior::Succeed);

        let id = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
        assert_eq!(finish(&registry, &id).await, JobState::Completed);
        assert_eq!(registry.cancel(&id).await, Some(JobState::Completed));
        assert_eq!(registry.get_status(&id).await, Some(JobState::Completed));
    }

    #[tokio::test]
    async fn test_evict_expired_keeps_running_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::HangUntilCancelled));
        let mut ctx = context(dir.path(), store, tool);
        ctx.config.job_retention = Duration::ZERO;
        let registry = JobRegistry::new(ctx);

        let running = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
        let cancelled = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
        registry.cancel(&cancelled).await;

        assert_eq!(registry.evict_expired().await, 1);
        assert!(registry.get_job(&cancelled).await.is_none());
        assert_eq!(registry.get_status(&running).await, Some(JobState::Running));
    }

    #[tokio::test]
    async fn test_evict_enforces_cap_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("b", "a.mp4", "source"));
        let tool = Arc::new(ScriptedTool::new(ToolBehavior::Succeed));
        let mut ctx = context(dir.path(), store, tool);
        ctx.config.max_retained_jobs = Some(2);
        let registry = JobRegistry::new(ctx);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = registry.create_job(request("s3://b/a.mp4")).await.unwrap();
            finish(&registry, &id).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            ids.push(id);
        }

        assert_eq!(registry.evict_expired().await, 1);
        assert!(registry.get_job(&ids[0]).await.is_none());
        assert!(registry.get_job(&ids[1]).await.is_some());
        assert!(registry.get_job(&ids[2]).await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry(dir.path(), ToolBehavior::Succeed));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&registry).run_eviction_loop(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
