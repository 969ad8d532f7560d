//! Tracing setup for the harness.
//!
//! - Console: stderr, compact. `RUST_LOG` wins when set; otherwise
//!   `info,shell=warn` (or `debug` with `--verbose`).
//! - Invocation log: `logs/<YYYYMMDD>.log`, appended, plain text at `info`.
//!
//! Subprocess output does not go through tracing; it is streamed into the
//! per-step logs by [`crate::io::process::run_command`].

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::error::FatalError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,shell=warn";
const VERBOSE_FILTER: &str = "debug";
const FILE_FILTER: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// Invocation log file; parent directories are created.
    pub log_file: Option<PathBuf>,
}

fn console_directives(verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ if verbose => VERBOSE_FILTER.to_string(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
///
/// An invocation log that can't be created is a [`FatalError`].
pub fn init(options: &LogOptions) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let console_filter = EnvFilter::try_new(console_directives(options.verbose, rust_log.as_deref()))
        .context("parse log filter")?;
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(console_filter);

    let file = match &options.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| {
                    FatalError::new(format!("can't create log dir {}: {err}", parent.display()))
                })?;
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    FatalError::new(format!("can't open log file {}: {err}", path.display()))
                })?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new(FILE_FILTER)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| anyhow!("install tracing subscriber: {err}"))
}
