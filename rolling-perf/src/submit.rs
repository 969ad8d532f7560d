//! Submission pipeline for a single commit: build -> perf tests -> publish -> upload.
//!
//! Any failing step aborts the rest and the error propagates. Nothing is
//! recorded here; the caller writes the history record only after `submit`
//! returns, so an interrupted submission is re-run from scratch next time.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::context::RunContext;
use crate::core::timestamp::{epoch_seconds, human_time};
use crate::core::types::{CommitId, SubmissionRecord};
use crate::io::build::Builder;
use crate::io::git::SourceRepo;
use crate::io::perf::TestRunner;
use crate::io::publish::ResultPublisher;
use crate::io::upload::{UploadOutcome, UploadRequest, Uploader};
use crate::walker::CommitWalker;

/// External collaborators the pipeline drives.
#[derive(Debug)]
pub struct Collaborators<'a, B, T, U> {
    pub builder: &'a B,
    pub tests: &'a T,
    pub uploader: &'a U,
}

/// Run the full pipeline for `commit`, which must be the walker's current position.
#[instrument(skip_all, fields(commit = %commit.short()))]
pub fn submit<R, B, T, U>(
    ctx: &RunContext,
    walker: &CommitWalker<R>,
    collaborators: &Collaborators<'_, B, T, U>,
    commit: &CommitId,
) -> Result<SubmissionRecord>
where
    R: SourceRepo,
    B: Builder,
    T: TestRunner,
    U: Uploader,
{
    let started_at = Utc::now();
    let committed_at = match walker.timestamp_of(commit) {
        Ok(stamp) => Some(stamp),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not read commit timestamp");
            None
        }
    };
    let repo_dir = walker.repo().path().to_path_buf();

    info!("building the watched repo");
    collaborators
        .builder
        .build(&ctx.step_request(commit, "build", &repo_dir))
        .with_context(|| format!("build {commit}"))?;

    info!("running the perf tests");
    let run = collaborators
        .tests
        .run_tests(&ctx.step_request(commit, "run-perftests", &repo_dir))
        .with_context(|| format!("perf tests for {commit}"))?;

    info!("publishing results");
    let publisher = ResultPublisher::new(&ctx.paths);
    let published = publisher
        .publish(commit, &run.results_dir, &ctx.config.tests.artifact_kinds())
        .with_context(|| format!("publish results for {commit}"))?;

    let upload = collaborators
        .uploader
        .upload(&UploadRequest {
            step: ctx.step_request(commit, "upload", &repo_dir),
            published_dir: published.dir.clone(),
            files: published.files.clone(),
        })
        .with_context(|| format!("upload results for {commit}"))?;
    if upload == UploadOutcome::Uploaded {
        info!("results uploaded");
    }

    Ok(SubmissionRecord {
        commit_id: commit.clone(),
        processed_at: epoch_seconds(started_at),
        processed_at_human: human_time(started_at),
        committed_at,
    })
}
