//! Optional upload of published results to an aggregation service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::error::FatalError;
use crate::io::build::{StepRequest, ensure_success, run_templated};
use crate::io::config::UploadConfig;

/// What to upload for one commit.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub step: StepRequest,
    /// Published results directory (`results/new/<commit>`).
    pub published_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Upload is disabled, or the commit published no artifacts.
    Skipped,
}

/// Abstraction over result upload backends.
pub trait Uploader {
    fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome>;
}

/// Uploader that runs the configured `[upload]` command, or does nothing when
/// upload is disabled.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    config: UploadConfig,
}

impl CommandUploader {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

}

/// Verify the upload credential is present. Missing credentials are only an
/// error when upload is enabled.
pub fn check_credentials(config: &UploadConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    check_token(&config.token_env, std::env::var(&config.token_env).ok())
}

fn check_token(name: &str, value: Option<String>) -> Result<()> {
    match value {
        Some(token) if !token.trim().is_empty() => Ok(()),
        _ => Err(FatalError::new(format!(
            "upload is enabled but environment variable {name} is not set"
        ))
        .into()),
    }
}

impl Uploader for CommandUploader {
    #[instrument(skip_all, fields(commit = %request.step.commit.short()))]
    fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome> {
        if !self.config.enabled {
            debug!("upload disabled, skipping");
            return Ok(UploadOutcome::Skipped);
        }
        if request.files.is_empty() {
            warn!(dir = %request.published_dir.display(), "no artifacts published, nothing to upload");
            return Ok(UploadOutcome::Skipped);
        }
        info!(files = request.files.len(), "uploading results");
        let output = run_templated(
            "upload",
            &self.config.command,
            &request.published_dir,
            Duration::from_secs(self.config.timeout_secs),
            &request.step,
        )?;
        ensure_success("upload", &output, &request.step)?;
        Ok(UploadOutcome::Uploaded)
    }
}
