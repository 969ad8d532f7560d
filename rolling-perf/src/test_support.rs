//! Test doubles for the harness collaborators and a throwaway git origin.
//!
//! Nothing here spawns build or test processes; `GitFixture` is the only
//! helper that shells out (to `git`).

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use tempfile::TempDir;

use crate::context::RunContext;
use crate::core::types::CommitId;
use crate::error::FatalError;
use crate::io::build::{Builder, StepRequest};
use crate::io::config::{RollingConfig, ToolConfig};
use crate::io::git::SourceRepo;
use crate::io::paths::WorkPaths;
use crate::io::perf::{TestRun, TestRunner};
use crate::io::tools::ToolInstaller;
use crate::io::upload::{UploadOutcome, UploadRequest, Uploader};

/// Commit time reported by [`FakeRepo`] for every commit.
pub const FAKE_COMMIT_TIME: &str = "2024-01-01T00:00:00Z";

fn id(raw: &str) -> CommitId {
    CommitId::parse(raw).unwrap_or_else(|err| panic!("invalid test commit id {raw:?}: {err}"))
}

/// A minimal valid config: echo-style commands, no support repos, upload off.
pub fn test_config() -> RollingConfig {
    let mut config = RollingConfig::default();
    config.repo.url = "https://example.invalid/watched.git".to_string();
    config.build.command = vec!["true".to_string()];
    config.tests.command = vec!["true".to_string()];
    config
}

/// Context rooted at `root`, tracking branch `main`.
pub fn test_context(root: &Path, look_back: u32) -> RunContext {
    RunContext::new(
        WorkPaths::new(root),
        test_config(),
        "main",
        look_back,
        Utc::now(),
    )
    .unwrap_or_else(|err| panic!("test context: {err:#}"))
}

#[derive(Debug, Default)]
struct FakeRepoState {
    /// Remote branch history, tip first.
    remote: Vec<CommitId>,
    /// History as of the last sync, tip first.
    checkout: Vec<CommitId>,
    /// Index into `checkout` of HEAD.
    head: usize,
    synced: Vec<String>,
    rewinds: u32,
    sync_error: Option<String>,
}

/// In-memory linear history. Clones share state, so a test can keep a handle
/// while the walker owns another.
#[derive(Debug, Clone)]
pub struct FakeRepo {
    path: PathBuf,
    state: Rc<RefCell<FakeRepoState>>,
}

impl FakeRepo {
    /// Repo whose remote branch holds `ids`, tip first.
    pub fn linear(path: impl Into<PathBuf>, ids: &[&str]) -> Self {
        let state = FakeRepoState {
            remote: ids.iter().map(|raw| id(raw)).collect(),
            ..FakeRepoState::default()
        };
        Self {
            path: path.into(),
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Land a new commit on the remote branch; visible after the next sync.
    pub fn push_commit(&self, raw: &str) {
        self.state.borrow_mut().remote.insert(0, id(raw));
    }

    /// Make every following sync fail with `message`.
    pub fn fail_sync(&self, message: &str) {
        self.state.borrow_mut().sync_error = Some(message.to_string());
    }

    pub fn synced_branches(&self) -> Vec<String> {
        self.state.borrow().synced.clone()
    }

    /// Number of `rewind` calls.
    pub fn rewinds(&self) -> u32 {
        self.state.borrow().rewinds
    }
}

impl SourceRepo for FakeRepo {
    fn path(&self) -> &Path {
        &self.path
    }

    fn sync(&self, branch: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = &state.sync_error {
            bail!("{message}");
        }
        state.synced.push(branch.to_string());
        state.checkout = state.remote.clone();
        state.head = 0;
        Ok(())
    }

    fn head_commit(&self) -> Result<CommitId> {
        let state = self.state.borrow();
        state
            .checkout
            .get(state.head)
            .cloned()
            .ok_or_else(|| anyhow!("fake repo has no checkout"))
    }

    fn commit_timestamp(&self, commit: &CommitId) -> Result<String> {
        if self.state.borrow().remote.contains(commit) {
            Ok(FAKE_COMMIT_TIME.to_string())
        } else {
            Err(anyhow!("unknown commit {commit}"))
        }
    }

    fn ancestor(&self, n: u32) -> Result<Option<CommitId>> {
        let state = self.state.borrow();
        Ok(state.checkout.get(state.head + n as usize).cloned())
    }

    fn rewind(&self, n: u32) -> Result<()> {
        if n < 1 {
            bail!("rewind requires n >= 1");
        }
        let mut state = self.state.borrow_mut();
        let target = state.head + n as usize;
        if target >= state.checkout.len() {
            bail!("cannot rewind {n} commits past the root");
        }
        state.head = target;
        state.rewinds += 1;
        Ok(())
    }
}

/// Builder that records calls and either succeeds or fails every build.
#[derive(Debug, Default)]
pub struct ScriptedBuilder {
    fail: bool,
    calls: RefCell<Vec<CommitId>>,
}

impl ScriptedBuilder {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CommitId> {
        self.calls.borrow().clone()
    }
}

impl Builder for ScriptedBuilder {
    fn build(&self, request: &StepRequest) -> Result<()> {
        self.calls.borrow_mut().push(request.commit.clone());
        if self.fail {
            bail!("scripted build failure");
        }
        Ok(())
    }
}

/// Test runner that writes `<commit>.<kind>` files for each configured kind
/// into `<repo_dir>/perf-results`.
#[derive(Debug, Default)]
pub struct ScriptedTestRunner {
    kinds: Vec<String>,
    fail: bool,
    calls: RefCell<Vec<CommitId>>,
}

impl ScriptedTestRunner {
    pub fn emitting(kinds: &[&str]) -> Self {
        Self {
            kinds: kinds.iter().map(|kind| kind.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CommitId> {
        self.calls.borrow().clone()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run_tests(&self, request: &StepRequest) -> Result<TestRun> {
        self.calls.borrow_mut().push(request.commit.clone());
        if self.fail {
            bail!("scripted perf test failure");
        }
        let results_dir = request.repo_dir.join("perf-results");
        fs::create_dir_all(&results_dir)
            .with_context(|| format!("create {}", results_dir.display()))?;
        for kind in &self.kinds {
            let path = results_dir.join(format!("{}.{kind}", request.commit));
            fs::write(&path, format!("{kind} for {}\n", request.commit))
                .with_context(|| format!("write {}", path.display()))?;
        }
        Ok(TestRun { results_dir })
    }
}

/// Uploader that counts uploaded files, or fails every upload.
#[derive(Debug, Default)]
pub struct ScriptedUploader {
    fail: bool,
    files: Cell<usize>,
}

impl ScriptedUploader {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploaded_files(&self) -> usize {
        self.files.get()
    }
}

impl Uploader for ScriptedUploader {
    fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome> {
        if self.fail {
            bail!("scripted upload failure");
        }
        self.files.set(self.files.get() + request.files.len());
        Ok(UploadOutcome::Uploaded)
    }
}

/// Installer that knows a fixed set of tools.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    present: BTreeSet<String>,
}

impl FakeInstaller {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            present: names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl ToolInstaller for FakeInstaller {
    fn ensure_installed(&self, tool: &ToolConfig) -> Result<()> {
        if self.present.contains(&tool.name) {
            Ok(())
        } else {
            Err(FatalError::new(format!("can't find {}", tool.name)).into())
        }
    }
}

/// A throwaway origin repository on branch `main`, plus scratch space for
/// checkouts.
#[derive(Debug)]
pub struct GitFixture {
    temp: TempDir,
    commits: Cell<u32>,
}

impl GitFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create fixture tempdir")?;
        let fixture = Self {
            temp,
            commits: Cell::new(0),
        };
        fs::create_dir_all(fixture.origin()).context("create origin dir")?;
        fs::create_dir_all(fixture.scratch()).context("create scratch dir")?;
        fixture.git(&["init", "--quiet"], &[])?;
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"], &[])?;
        fixture.git(&["config", "user.name", "Perf Bot"], &[])?;
        fixture.git(&["config", "user.email", "perf-bot@example.invalid"], &[])?;
        fixture.git(&["config", "commit.gpgsign", "false"], &[])?;
        Ok(fixture)
    }

    fn origin(&self) -> PathBuf {
        self.temp.path().join("origin")
    }

    /// Clone URL of the origin.
    pub fn url(&self) -> String {
        self.origin().display().to_string()
    }

    /// Empty directory for checkouts and working directories.
    pub fn scratch(&self) -> PathBuf {
        self.temp.path().join("scratch")
    }

    /// Add an empty commit to `main` with a deterministic, increasing date.
    pub fn commit(&self, message: &str) -> Result<CommitId> {
        let n = self.commits.get();
        self.commits.set(n + 1);
        let date = format!("2024-01-01T{:02}:{:02}:00Z", n / 60, n % 60);
        self.commit_at(message, &date)
    }

    /// Add an empty commit dated `date` (RFC 3339).
    pub fn commit_at(&self, message: &str, date: &str) -> Result<CommitId> {
        self.git(
            &["commit", "--quiet", "--allow-empty", "-m", message],
            &[("GIT_AUTHOR_DATE", date), ("GIT_COMMITTER_DATE", date)],
        )?;
        let head = self.git(&["rev-parse", "HEAD"], &[])?;
        CommitId::parse(head.trim())
    }

    fn git(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .envs(envs.iter().copied())
            .current_dir(self.origin())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
