//! In-memory collaborators for exercising jobs without FFmpeg or S3.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::FutureExt;
use tokio::sync::{watch, Mutex};
use trim_media::{Invocation, MediaError, MediaResult, MediaTool, ProcessHandle, SpawnedProcess};
use trim_models::ObjectLocation;
use trim_storage::{ObjectStore, StorageError, StorageResult};

use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::job::TrimJob;

/// Object store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectLocation, Vec<u8>>>,
    failing_uploads: Vec<String>,
    failing_downloads: Vec<String>,
    remove_after_upload: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.objects
            .get_mut()
            .insert(ObjectLocation::new(bucket, key), data.into());
        self
    }

    /// Uploads whose key ends with `suffix` fail.
    pub fn fail_upload(mut self, suffix: impl Into<String>) -> Self {
        self.failing_uploads.push(suffix.into());
        self
    }

    /// Downloads of `key` fail with a transport error.
    pub fn fail_download(mut self, key: impl Into<String>) -> Self {
        self.failing_downloads.push(key.into());
        self
    }

    /// Delete the local file during upload, so the publisher's own removal fails.
    pub fn remove_after_upload(mut self) -> Self {
        self.remove_after_upload = true;
        self
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(&ObjectLocation::new(bucket, key))
            .cloned()
    }

    pub async fn uploaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .await
            .keys()
            .map(|l| l.to_uri())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download_file(&self, location: &ObjectLocation, path: &Path) -> StorageResult<()> {
        if self.failing_downloads.contains(&location.key) {
            return Err(StorageError::download_failed(format!("{}: connection reset", location)));
        }

        let data = self
            .objects
            .lock()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| StorageError::not_found(location.to_uri()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn upload_file(&self, path: &Path, location: &ObjectLocation) -> StorageResult<()> {
        if self.failing_uploads.iter().any(|s| location.key.ends_with(s)) {
            return Err(StorageError::upload_failed(format!("{}: access denied", location)));
        }

        let data = tokio::fs::read(path).await?;
        self.objects.lock().await.insert(location.clone(), data);

        if self.remove_after_upload {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

/// How a [`ScriptedTool`] process behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBehavior {
    /// Write the output file and exit 0
    Succeed,
    /// Exit 1 without output
    Fail,
    /// Run until cancelled, then exit non-zero
    HangUntilCancelled,
    /// Never exit, even when cancelled
    IgnoreCancel,
}

/// Media tool that follows a script instead of running FFmpeg.
pub struct ScriptedTool {
    behavior: ToolBehavior,
    failing_inputs: Vec<String>,
    invocations: Mutex<Vec<Invocation>>,
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
    next_id: AtomicUsize,
}

impl ScriptedTool {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self {
            behavior,
            failing_inputs: Vec::new(),
            invocations: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Invocations with an argument containing `fragment` fail.
    pub fn fail_input(mut self, fragment: impl Into<String>) -> Self {
        self.failing_inputs.push(fragment.into());
        self
    }

    pub async fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().await.clone()
    }

    /// Total `cancel` calls across every spawned process.
    pub async fn cancel_count(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .map(|h| h.cancels.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait]
impl MediaTool for ScriptedTool {
    async fn spawn(&self, invocation: &Invocation) -> MediaResult<SpawnedProcess> {
        self.invocations.lock().await.push(invocation.clone());

        let failing = self
            .failing_inputs
            .iter()
            .any(|f| invocation.args.iter().any(|a| a.contains(f.as_str())));
        // FFmpeg refuses to overwrite one of its own inputs
        let output_arg = invocation.output.to_string_lossy();
        let overwrites_input = invocation
            .args
            .windows(2)
            .any(|pair| pair[0] == "-i" && pair[1] == output_arg);

        let behavior = if failing || overwrites_input {
            ToolBehavior::Fail
        } else {
            self.behavior
        };

        let (cancelled, mut cancel_rx) = watch::channel(false);
        let handle = Arc::new(ScriptedHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            cancelled,
            cancels: AtomicUsize::new(0),
        });
        self.handles.lock().await.push(Arc::clone(&handle));

        let output = invocation.output.clone();
        let exit = async move {
            match behavior {
                ToolBehavior::Succeed => {
                    if let Some(parent) = output.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&output, b"trimmed").await?;
                    Ok(())
                }
                ToolBehavior::Fail => Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with non-zero status",
                    Some("Invalid data found when processing input".to_string()),
                    Some(1),
                )),
                ToolBehavior::HangUntilCancelled => {
                    let _ = cancel_rx.wait_for(|c| *c).await;
                    Err(MediaError::ffmpeg_failed("Interrupted", None, Some(255)))
                }
                ToolBehavior::IgnoreCancel => {
                    futures::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
        .boxed();

        Ok(SpawnedProcess { handle, exit })
    }
}

/// Handle to a scripted process.
#[derive(Debug)]
pub struct ScriptedHandle {
    id: usize,
    cancelled: watch::Sender<bool>,
    cancels: AtomicUsize,
}

impl ScriptedHandle {
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl ProcessHandle for ScriptedHandle {
    fn id(&self) -> String {
        format!("scripted-{}", self.id)
    }

    fn cancel(&self) -> MediaResult<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.send_replace(true);
        Ok(())
    }
}

/// Context with `work_dir` as staging root and default retention.
pub fn context(work_dir: &Path, store: Arc<MemoryStore>, tool: Arc<ScriptedTool>) -> ProcessingContext {
    let config = WorkerConfig {
        work_dir: work_dir.to_path_buf(),
        ..Default::default()
    };
    ProcessingContext::new(config, store, tool)
}

/// Wait until `job` owns `count` processes, for up to two seconds.
pub async fn wait_for_processes(job: &TrimJob, count: usize) -> bool {
    for _ in 0..400 {
        if job.process_count().await == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
