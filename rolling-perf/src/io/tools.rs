//! Preflight checks for external tools.

use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::error::FatalError;
use crate::io::config::ToolConfig;
use crate::io::process::{RunOptions, run_command};

const CHECK_TIMEOUT: Duration = Duration::from_secs(60);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Makes sure a required external tool is usable.
pub trait ToolInstaller {
    fn ensure_installed(&self, tool: &ToolConfig) -> Result<()>;
}

/// Runs each tool's check command. If the check fails, runs the configured
/// install command once and checks again.
#[derive(Debug, Clone, Default)]
pub struct CommandToolInstaller;

impl ToolInstaller for CommandToolInstaller {
    #[instrument(skip_all, fields(tool = %tool.name))]
    fn ensure_installed(&self, tool: &ToolConfig) -> Result<()> {
        info!("making sure {} exists", tool.name);
        if runs_ok(&tool.check, CHECK_TIMEOUT) {
            return Ok(());
        }
        if !tool.install.is_empty() {
            warn!("check failed, running install command");
            if runs_ok(&tool.install, INSTALL_TIMEOUT) && runs_ok(&tool.check, CHECK_TIMEOUT) {
                return Ok(());
            }
        }
        Err(FatalError::new(format!(
            "can't find {}, please make sure it's installed and on PATH",
            tool.name
        ))
        .into())
    }
}

/// True if `argv` runs and exits successfully. Spawn failures count as failure.
fn runs_ok(argv: &[String], timeout: Duration) -> bool {
    let Some((program, args)) = argv.split_first() else {
        return false;
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    let options = RunOptions {
        timeout,
        ..RunOptions::default()
    };
    match run_command(cmd, &options) {
        Ok(output) => output.success(),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "check could not run");
            false
        }
    }
}
