//! Performance test runner abstraction.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::error::FatalError;
use crate::io::build::{StepRequest, ensure_success, run_templated};
use crate::io::config::TestsConfig;

/// Where a finished test run left its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    /// Directory containing `<commit>.<kind>` files.
    pub results_dir: PathBuf,
}

/// Abstraction over perf test backends.
pub trait TestRunner {
    /// Run the perf suite against the built commit.
    fn run_tests(&self, request: &StepRequest) -> Result<TestRun>;
}

/// Runner that executes the configured `[tests]` command.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    config: TestsConfig,
}

impl CommandTestRunner {
    pub fn new(config: TestsConfig) -> Self {
        Self { config }
    }
}

impl TestRunner for CommandTestRunner {
    #[instrument(skip_all, fields(commit = %request.commit.short()))]
    fn run_tests(&self, request: &StepRequest) -> Result<TestRun> {
        let mut request = request.clone();
        if let Some(dir) = &self.config.runtime_id_dir {
            let runtime_id =
                detect_runtime_id(&request.repo_dir.join(dir), &self.config.runtime_id_ignore)?;
            debug!(runtime_id = %runtime_id, "detected runtime id");
            request.vars.runtime_id = Some(runtime_id);
        }

        info!("running perf tests");
        let workdir = request.repo_dir.join(&self.config.workdir);
        let output = run_templated(
            "perf tests",
            &self.config.command,
            &workdir,
            Duration::from_secs(self.config.timeout_secs),
            &request,
        )?;
        ensure_success("perf tests", &output, &request)?;

        Ok(TestRun {
            results_dir: request.repo_dir.join(&self.config.results_dir),
        })
    }
}

/// Find the single entry of `dir` not listed in `ignore`.
///
/// Build outputs are laid out as `<dir>/<runtime-id>/...`; anything other than
/// exactly one candidate means we cannot tell which build to test.
pub fn detect_runtime_id(dir: &Path, ignore: &[String]) -> Result<String> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        entries.push(entry.file_name().to_string_lossy().to_string());
    }
    entries.sort();

    let candidates: Vec<&String> = entries
        .iter()
        .filter(|name| !ignore.iter().any(|ignored| ignored == *name))
        .collect();
    match candidates.as_slice() {
        [only] => Ok((*only).clone()),
        _ => Err(FatalError::new(format!(
            "failed to detect runtime id in {}: not sure which of [{}] to use",
            dir.display(),
            entries.join(", ")
        ))
        .into()),
    }
}
