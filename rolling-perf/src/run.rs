//! Run controller: one invocation of the rolling perf harness.
//!
//! `INIT -> SYNCING -> SCANNING -> SUBMITTING -> DONE`, with `FAILED` on any
//! error. At most one new commit is submitted per invocation; `look_back` only
//! bounds how far back the scan searches for it.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};

use crate::context::RunContext;
use crate::core::phase::{RunPhase, ScanStep, ScanStop};
use crate::core::types::{CommitId, SubmissionRecord};
use crate::io::build::Builder;
use crate::io::config::RollingConfig;
use crate::io::git::SourceRepo;
use crate::io::history::HistoryStore;
use crate::io::perf::TestRunner;
use crate::io::publish::ResultPublisher;
use crate::io::tools::ToolInstaller;
use crate::io::upload::{Uploader, check_credentials};
use crate::submit::{Collaborators, submit};
use crate::walker::CommitWalker;

/// A repository synced alongside the watched one (at its own fixed branch).
#[derive(Debug)]
pub struct SupportRepo<R> {
    pub name: String,
    pub branch: String,
    pub repo: R,
}

/// Attached to the error of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFailed {
    /// Terminal phase; always `Failed`.
    pub phase: RunPhase,
    /// Phase that was running when the error occurred.
    pub during: RunPhase,
}

impl fmt::Display for RunFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run failed while {}", self.during)
    }
}

/// Summary of a finished invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Terminal phase; always `Done` for a returned outcome.
    pub phase: RunPhase,
    pub tip: CommitId,
    /// Every examined position, most recent first.
    pub scanned: Vec<ScanStep>,
    pub stop: ScanStop,
    pub submission: Option<SubmissionRecord>,
    /// Positioning steps taken backwards from the tip.
    pub steps_back: u32,
    pub stale_staging_removed: usize,
}

impl RunOutcome {
    pub fn submitted(&self) -> Option<&CommitId> {
        self.submission.as_ref().map(|record| &record.commit_id)
    }
}

/// INIT checks: required tools are usable and upload credentials are present.
///
/// Failures are [`crate::error::FatalError`]s.
#[instrument(skip_all)]
pub fn preflight<I: ToolInstaller>(config: &RollingConfig, installer: &I) -> Result<()> {
    for tool in &config.tools {
        installer.ensure_installed(tool)?;
    }
    check_credentials(&config.upload)?;
    Ok(())
}

/// Run INIT through DONE once.
///
/// On error the run moves to `FAILED`; the returned error carries a
/// [`RunFailed`] context naming the phase that failed.
pub fn run_once<I, R, B, T, U>(
    ctx: &RunContext,
    installer: &I,
    walker: &mut CommitWalker<R>,
    support: &[SupportRepo<R>],
    history: &mut HistoryStore,
    collaborators: &Collaborators<'_, B, T, U>,
) -> Result<RunOutcome>
where
    I: ToolInstaller,
    R: SourceRepo,
    B: Builder,
    T: TestRunner,
    U: Uploader,
{
    let mut phase = RunPhase::Init;
    let result = drive(ctx, installer, walker, support, history, collaborators, &mut phase);
    match result {
        Ok(outcome) => {
            info!(
                phase = %outcome.phase,
                stop = ?outcome.stop,
                submitted = ?outcome.submitted().map(CommitId::as_str),
                examined = outcome.scanned.len(),
                "run finished"
            );
            Ok(outcome)
        }
        Err(err) => {
            let during = phase;
            enter(&mut phase, RunPhase::Failed);
            error!(phase = %phase, during = %during, err = %format!("{err:#}"), "run failed");
            Err(err.context(RunFailed { phase, during }))
        }
    }
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = %phase, to = %next, "phase transition");
    *phase = next;
}

fn drive<I, R, B, T, U>(
    ctx: &RunContext,
    installer: &I,
    walker: &mut CommitWalker<R>,
    support: &[SupportRepo<R>],
    history: &mut HistoryStore,
    collaborators: &Collaborators<'_, B, T, U>,
    phase: &mut RunPhase,
) -> Result<RunOutcome>
where
    I: ToolInstaller,
    R: SourceRepo,
    B: Builder,
    T: TestRunner,
    U: Uploader,
{
    preflight(&ctx.config, installer)?;

    enter(phase, RunPhase::Syncing);
    info!(branch = %ctx.branch, "refreshing repos to look for new commits");
    let tip = walker
        .refresh(&ctx.branch)
        .with_context(|| format!("sync watched branch {}", ctx.branch))?;
    for repo in support {
        repo.repo
            .sync(&repo.branch)
            .with_context(|| format!("sync support repo {} ({})", repo.name, repo.branch))?;
    }

    enter(phase, RunPhase::Scanning);
    let stale_staging_removed = ResultPublisher::new(&ctx.paths).sweep_staging()?;

    let mut scanned = Vec::new();
    let mut submission = None;
    let mut stop = ScanStop::LookBackExhausted;
    for n in 0..ctx.look_back {
        let commit = walker.current()?;
        if history.has(&commit)? {
            info!(commit = %commit, "commit has already been processed");
            scanned.push(ScanStep::AlreadyProcessed(commit));
            if n + 1 < ctx.look_back && walker.step_back(1)?.is_none() {
                info!("reached the start of history");
                stop = ScanStop::HistoryExhausted;
                break;
            }
            continue;
        }

        info!(commit = %commit, "commit is new, kicking off submission");
        enter(phase, RunPhase::Submitting);
        let record = submit(ctx, walker, collaborators, &commit)?;
        history
            .record(&commit, record.to_commit_record())
            .with_context(|| format!("record {commit} in history"))?;
        scanned.push(ScanStep::Submitted(commit));
        submission = Some(record);
        stop = ScanStop::Submitted;
        break;
    }

    debug!(records = history.len()?, "scan finished");
    enter(phase, RunPhase::Done);
    Ok(RunOutcome {
        phase: *phase,
        tip,
        scanned,
        stop,
        submission,
        steps_back: walker.steps_back(),
        stale_staging_removed,
    })
}
