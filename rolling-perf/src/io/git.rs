//! Git adapter for watched and support repositories.
//!
//! The harness only needs a handful of operations (sync to the remote tip,
//! read HEAD, read a commit time, step back through history), so we keep a
//! small, explicit wrapper around `git` subprocess calls behind the
//! [`SourceRepo`] trait.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::timestamp::normalize_commit_time;
use crate::core::types::CommitId;
use crate::io::process::display_command;

/// Source control operations the walker and run controller depend on.
pub trait SourceRepo {
    /// Local checkout directory.
    fn path(&self) -> &Path;

    /// Bring the checkout to the remote tip of `branch` (fetch + hard reset).
    fn sync(&self, branch: &str) -> Result<()>;

    /// Commit currently checked out.
    fn head_commit(&self) -> Result<CommitId>;

    /// Commit time of `commit`, normalized to `YYYY-MM-DDTHH:MM:SSZ`.
    fn commit_timestamp(&self, commit: &CommitId) -> Result<String>;

    /// The `n`-th ancestor of the checked out commit, or `None` if history is
    /// shorter than that.
    fn ancestor(&self, n: u32) -> Result<Option<CommitId>>;

    /// Check out the `n`-th ancestor of the checked out commit.
    fn rewind(&self, n: u32) -> Result<()>;
}

/// A git checkout under the working directory, cloned from `url`.
#[derive(Debug, Clone)]
pub struct GitRepo {
    url: String,
    path: PathBuf,
    fresh_clone: bool,
}

impl GitRepo {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            fresh_clone: false,
        }
    }

    /// Remove and re-clone the checkout before every sync.
    pub fn with_fresh_clone(mut self, fresh_clone: bool) -> Self {
        self.fresh_clone = fresh_clone;
        self
    }

    pub fn exists(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Clone if the checkout is missing (after removing it when `fresh_clone`).
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn ensure_cloned(&self) -> Result<()> {
        if self.fresh_clone && self.path.exists() {
            info!("removing checkout for a fresh clone");
            fs::remove_dir_all(&self.path)
                .with_context(|| format!("remove checkout {}", self.path.display()))?;
        }
        if self.exists() {
            debug!("checkout already present");
            return Ok(());
        }
        if self.path.exists() {
            return Err(anyhow!(
                "{} exists but is not a git checkout",
                self.path.display()
            ));
        }
        let parent = self
            .path
            .parent()
            .with_context(|| format!("checkout path missing parent {}", self.path.display()))?;
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        info!(url = %self.url, "cloning");
        let target = self.path.to_string_lossy().to_string();
        run_git_in(parent, &["clone", "--quiet", &self.url, &target])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = run_git_in(&self.path, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl SourceRepo for GitRepo {
    fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip_all, fields(path = %self.path.display(), branch = %branch))]
    fn sync(&self, branch: &str) -> Result<()> {
        self.ensure_cloned()?;
        run_git_in(&self.path, &["fetch", "--all", "--quiet"])?;
        run_git_in(&self.path, &["checkout", "--quiet", branch])?;
        let remote_ref = format!("origin/{branch}");
        run_git_in(&self.path, &["reset", "--quiet", "--hard", &remote_ref])?;
        debug!("synced to remote tip");
        Ok(())
    }

    fn head_commit(&self) -> Result<CommitId> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        CommitId::parse(&out).context("parse HEAD commit id")
    }

    fn commit_timestamp(&self, commit: &CommitId) -> Result<String> {
        let out = self.run_capture(&["show", "-s", "--format=%cI", commit.as_str()])?;
        normalize_commit_time(&out)
    }

    fn ancestor(&self, n: u32) -> Result<Option<CommitId>> {
        let rev = format!("HEAD~{n}^{{commit}}");
        let output = run_git_unchecked(&self.path, &["rev-parse", "--verify", "--quiet", &rev])?;
        if !output.status.success() {
            debug!(n, "no such ancestor");
            return Ok(None);
        }
        let id = CommitId::parse(&String::from_utf8_lossy(&output.stdout))
            .context("parse ancestor commit id")?;
        Ok(Some(id))
    }

    #[instrument(skip_all, fields(path = %self.path.display(), n = n))]
    fn rewind(&self, n: u32) -> Result<()> {
        if n < 1 {
            return Err(anyhow!("rewind count must be >= 1 (got {n})"));
        }
        let rev = format!("HEAD~{n}");
        run_git_in(&self.path, &["checkout", "--quiet", &rev])?;
        Ok(())
    }
}

fn git_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    cmd
}

fn run_git_unchecked(dir: &Path, args: &[&str]) -> Result<Output> {
    let mut cmd = git_command(dir, args);
    debug!(target: "shell", dir = %dir.display(), "{}", display_command(&cmd));
    cmd.output()
        .with_context(|| format!("spawn git {}", args.join(" ")))
}

fn run_git_in(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = run_git_unchecked(dir, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
    }
    Ok(output)
}
