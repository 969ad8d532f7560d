//! Build step abstraction.
//!
//! The [`Builder`] trait decouples the submission pipeline from the concrete
//! build command. Tests use scripted builders that never spawn processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::template::{CommandVars, render_command};
use crate::core::types::CommitId;
use crate::io::config::BuildConfig;
use crate::io::process::{CommandOutput, RunOptions, run_command};

/// Inputs shared by every per-commit step (build, perf run, upload).
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub commit: CommitId,
    /// Root of the watched checkout.
    pub repo_dir: PathBuf,
    /// Template variables for configured commands.
    pub vars: CommandVars,
    /// Per-step subprocess log (`logs/<date>.<commit>.<step>.log`).
    pub log_path: PathBuf,
    /// Banner written at the top of the step log.
    pub log_banner: String,
    pub output_limit_bytes: usize,
}

/// Abstraction over build backends.
pub trait Builder {
    /// Build the checked out commit. Any error aborts the submission.
    fn build(&self, request: &StepRequest) -> Result<()>;
}

/// Builder that runs the configured `[build]` command.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: BuildConfig,
}

impl CommandBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }
}

impl Builder for CommandBuilder {
    #[instrument(skip_all, fields(commit = %request.commit.short()))]
    fn build(&self, request: &StepRequest) -> Result<()> {
        info!("building");
        let workdir = request.repo_dir.join(&self.config.workdir);
        let output = run_templated(
            "build",
            &self.config.command,
            &workdir,
            Duration::from_secs(self.config.timeout_secs),
            request,
        )?;
        ensure_success("build", &output, request)?;
        debug!("build completed successfully");
        Ok(())
    }
}

/// Render `template` with the request's variables and run it in `workdir`,
/// streaming output into the request's step log.
pub(crate) fn run_templated(
    label: &str,
    template: &[String],
    workdir: &std::path::Path,
    timeout: Duration,
    request: &StepRequest,
) -> Result<CommandOutput> {
    let argv = render_command(template, &request.vars)
        .with_context(|| format!("render {label} command"))?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("{label} command is empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    run_command(
        cmd,
        &RunOptions {
            timeout,
            output_limit_bytes: request.output_limit_bytes,
            log_path: Some(&request.log_path),
            log_banner: Some(&request.log_banner),
        },
    )
    .with_context(|| format!("run {label} command"))
}

pub(crate) fn ensure_success(label: &str, output: &CommandOutput, request: &StepRequest) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    warn!(
        exit_code = ?output.status.code(),
        timed_out = output.timed_out,
        log = %request.log_path.display(),
        "{label} failed"
    );
    Err(anyhow!(
        "{label} for {} {} (see {})",
        request.commit,
        output.describe_failure(),
        request.log_path.display()
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn request(root: &std::path::Path) -> StepRequest {
        StepRequest {
            commit: CommitId::parse("abc123").expect("commit"),
            repo_dir: root.to_path_buf(),
            vars: CommandVars {
                commit_id: "abc123".to_string(),
                ..CommandVars::default()
            },
            log_path: root.join("logs/20240301.abc123.build.log"),
            log_banner: "started".to_string(),
            output_limit_bytes: 1000,
        }
    }

    fn builder(script: &str) -> CommandBuilder {
        CommandBuilder::new(BuildConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..BuildConfig::default()
        })
    }

    #[test]
    fn successful_build_writes_step_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(temp.path());
        builder("echo building {{ commit_id }}")
            .build(&request)
            .expect("build");
        let log = fs::read_to_string(&request.log_path).expect("read log");
        assert!(log.contains("building abc123"));
    }

    #[test]
    fn failing_build_is_an_error_naming_the_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(temp.path());
        let err = builder("exit 7").build(&request).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with code 7"), "{msg}");
        assert!(msg.contains("build.log"), "{msg}");
    }
}
