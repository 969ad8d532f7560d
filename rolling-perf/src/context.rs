//! Per-invocation context, built once at startup and passed to every component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::core::template::CommandVars;
use crate::core::timestamp::{human_time, log_date_stamp};
use crate::core::types::CommitId;
use crate::error::fatal;
use crate::io::build::StepRequest;
use crate::io::config::RollingConfig;
use crate::io::paths::WorkPaths;

/// Everything an invocation needs to know, resolved from CLI and config.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub paths: WorkPaths,
    pub config: RollingConfig,
    /// Branch of the watched repository.
    pub branch: String,
    /// Maximum number of commits to examine, tip included.
    pub look_back: u32,
    pub launched_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(
        paths: WorkPaths,
        config: RollingConfig,
        branch: impl Into<String>,
        look_back: u32,
        launched_at: DateTime<Utc>,
    ) -> Result<Self> {
        let branch = branch.into();
        if branch.trim().is_empty() {
            return fatal("--branch must not be empty");
        }
        if look_back < 1 {
            return fatal(format!("--look-back must be >= 1 (got {look_back})"));
        }
        Ok(Self {
            paths,
            config,
            branch,
            look_back,
            launched_at,
        })
    }

    pub fn watched_repo_dir(&self) -> PathBuf {
        self.paths.repo_dir(&self.config.repo.name)
    }

    /// Support repo name -> checkout path.
    pub fn support_repo_dirs(&self) -> BTreeMap<String, String> {
        self.config
            .support_repos
            .iter()
            .map(|repo| {
                (
                    repo.name.clone(),
                    self.paths.repo_dir(&repo.name).display().to_string(),
                )
            })
            .collect()
    }

    /// `YYYYMMDD` of the launch, used in log file names.
    pub fn log_date(&self) -> String {
        log_date_stamp(self.launched_at)
    }

    pub fn launch_banner(&self) -> String {
        format!("rolling-perf started at {}", human_time(self.launched_at))
    }

    pub fn command_vars(&self, commit: &CommitId, repo_dir: &Path) -> CommandVars {
        CommandVars {
            commit_id: commit.to_string(),
            repo_dir: repo_dir.display().to_string(),
            working_dir: self.paths.root.display().to_string(),
            results_dir: self.paths.results_dir.display().to_string(),
            runtime_id: None,
            repos: self.support_repo_dirs(),
        }
    }

    /// Request for the per-commit step named `step` (`build`, `run-perftests`, `upload`).
    pub fn step_request(&self, commit: &CommitId, step: &str, repo_dir: &Path) -> StepRequest {
        StepRequest {
            commit: commit.clone(),
            repo_dir: repo_dir.to_path_buf(),
            vars: self.command_vars(commit, repo_dir),
            log_path: self.paths.step_log(&self.log_date(), commit, step),
            log_banner: self.launch_banner(),
            output_limit_bytes: self.config.output_limit_bytes,
        }
    }
}
