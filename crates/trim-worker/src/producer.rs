//! Production strategies.
//!
//! A [`Production`] turns an accepted request into published outputs. Each
//! variant owns its fan-out and fan-in policy:
//!
//! - `Single` cuts every source into one output. Any fetch, process or upload
//!   failure cancels the job, and so does a cleanup failure after publishing.
//! - `MultiRendition` renders one output per source concurrently. Failures
//!   are recorded per rendition and never abort siblings; the job completes
//!   once every rendition has been attempted.

use std::path::PathBuf;

use futures::future::join_all;
use trim_media::{build_invocations, build_rendition_invocation, MediaTool};
use trim_models::{JobState, RenditionOutcome, ResolvedRequest, TrimMode, TrimRequest};
use trim_storage::{PublishError, Publisher, StagingArea, StorageResult};

use crate::error::{WorkerError, WorkerResult};
use crate::job::TrimJob;
use crate::logging::JobLogger;
use crate::metrics;

/// How a request's sources become deliverables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    Single,
    MultiRendition,
}

impl From<TrimMode> for Production {
    fn from(mode: TrimMode) -> Self {
        match mode {
            TrimMode::Single => Production::Single,
            TrimMode::MultiRendition => Production::MultiRendition,
        }
    }
}

/// Borrowed view of everything one production run touches.
pub struct ProductionContext<'a> {
    pub job: &'a TrimJob,
    pub request: &'a TrimRequest,
    pub resolved: &'a ResolvedRequest,
    pub staging: &'a StagingArea,
    pub publisher: &'a Publisher,
    pub tool: &'a dyn MediaTool,
    pub logger: &'a JobLogger,
}

/// Result of a production run, applied to the job when it finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionOutcome {
    pub state: JobState,
    pub outputs: Vec<String>,
    pub renditions: Vec<RenditionOutcome>,
    pub failure: Option<String>,
}

impl ProductionOutcome {
    fn completed(outputs: Vec<String>, renditions: Vec<RenditionOutcome>) -> Self {
        Self {
            state: JobState::Completed,
            outputs,
            renditions,
            failure: None,
        }
    }

    fn cancelled(failure: &WorkerError) -> Self {
        Self {
            state: JobState::Cancelled,
            outputs: Vec::new(),
            renditions: Vec::new(),
            failure: Some(failure.to_string()),
        }
    }
}

impl Production {
    /// Operation name used in logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Production::Single => "trim_single",
            Production::MultiRendition => "trim_multi_rendition",
        }
    }

    pub async fn produce(&self, ctx: &ProductionContext<'_>) -> ProductionOutcome {
        // Inputs and outputs live in separate subdirectories of the staging area
        if let Err(e) = ctx.staging.ensure().await {
            let err = WorkerError::from(e);
            ctx.logger.failed(&err);
            return ProductionOutcome::cancelled(&err);
        }

        match self {
            Production::Single => produce_single(ctx).await,
            Production::MultiRendition => produce_multi(ctx).await,
        }
    }
}

async fn produce_single(ctx: &ProductionContext<'_>) -> ProductionOutcome {
    let result = single_pass(ctx).await;
    let purged = ctx.staging.purge().await;

    match (result, purged) {
        (Ok(url), Ok(())) => ProductionOutcome::completed(vec![url], Vec::new()),
        (Ok(url), Err(e)) => {
            let err = WorkerError::cleanup(url, e.to_string());
            ctx.logger.failed(&err);
            ProductionOutcome::cancelled(&err)
        }
        (Err(err), purged) => {
            if let Err(e) = purged {
                ctx.logger.purge_failed(&e);
            }
            ctx.logger.failed(&err);
            ProductionOutcome::cancelled(&err)
        }
    }
}

async fn single_pass(ctx: &ProductionContext<'_>) -> WorkerResult<String> {
    let mut inputs = Vec::with_capacity(ctx.resolved.sources.len());
    for fetched in ctx.staging.fetch_all(&ctx.resolved.sources).await {
        inputs.push(fetched?);
    }

    let invocation = build_invocations(
        &ctx.request.edl,
        &inputs,
        TrimMode::Single,
        &ctx.staging.outputs_dir(),
    )?
    .into_iter()
    .next()
    .ok_or_else(|| WorkerError::internal("no invocation built for single output"))?;
    ctx.logger.cutting(ctx.request.edl.segments.len(), inputs.len());

    ctx.job.execute(ctx.tool, &invocation).await?;

    let url = ctx
        .publisher
        .publish(&invocation.output, &ctx.resolved.destination)
        .await?;
    Ok(url)
}

async fn produce_multi(ctx: &ProductionContext<'_>) -> ProductionOutcome {
    let fetched = ctx.staging.fetch_all(&ctx.resolved.sources).await;

    let renditions = join_all(
        fetched
            .into_iter()
            .enumerate()
            .map(|(index, input)| rendition(ctx, index, input)),
    )
    .await;

    if let Err(e) = ctx.staging.purge().await {
        ctx.logger.purge_failed(&e);
    }

    let outputs: Vec<String> = renditions.iter().filter_map(|r| r.url.clone()).collect();
    ctx.logger.renditions_published(outputs.len(), renditions.len());

    ProductionOutcome::completed(outputs, renditions)
}

async fn rendition(
    ctx: &ProductionContext<'_>,
    index: usize,
    input: StorageResult<PathBuf>,
) -> RenditionOutcome {
    let source = ctx.request.sources.get(index).cloned().unwrap_or_default();

    match render_and_publish(ctx, index, input).await {
        Ok(url) => RenditionOutcome::published(index, source, url),
        Err(e) => {
            metrics::record_rendition_failed();
            ctx.logger.rendition_failed(index, &source, &e);
            RenditionOutcome::failed(index, source, e.to_string())
        }
    }
}

async fn render_and_publish(
    ctx: &ProductionContext<'_>,
    index: usize,
    input: StorageResult<PathBuf>,
) -> WorkerResult<String> {
    let input = input?;
    let invocation =
        build_rendition_invocation(&ctx.request.edl, index, &input, &ctx.staging.outputs_dir())?;

    ctx.job.execute(ctx.tool, &invocation).await?;

    match ctx
        .publisher
        .publish(&invocation.output, &ctx.resolved.destination)
        .await
    {
        Ok(url) => Ok(url),
        // The purge that follows removes the leftover file
        Err(PublishError::Cleanup { url, source }) => {
            ctx.logger.local_copy_kept(&url, &source);
            Ok(url)
        }
        Err(e) => Err(e.into()),
    }
}
