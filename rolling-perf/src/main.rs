//! Rolling performance harness CLI.
//!
//! One invocation syncs the watched branch, finds the newest unprocessed
//! commit within `--look-back` commits of the tip, and builds, perf-tests,
//! publishes and (optionally) uploads it. Schedule it (cron, CI) to keep up
//! with a branch one commit at a time.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use rolling_perf::context::RunContext;
use rolling_perf::core::timestamp::log_date_stamp;
use rolling_perf::error::{exit_code_for, is_fatal};
use rolling_perf::exit_codes;
use rolling_perf::io::build::CommandBuilder;
use rolling_perf::io::config::load_config;
use rolling_perf::io::git::GitRepo;
use rolling_perf::io::history::HistoryStore;
use rolling_perf::io::paths::WorkPaths;
use rolling_perf::io::perf::CommandTestRunner;
use rolling_perf::io::tools::CommandToolInstaller;
use rolling_perf::io::upload::CommandUploader;
use rolling_perf::logging::{self, LogOptions};
use rolling_perf::run::{RunOutcome, SupportRepo, run_once};
use rolling_perf::submit::Collaborators;
use rolling_perf::walker::CommitWalker;

#[derive(Parser, Debug)]
#[command(
    name = "rolling-perf",
    version,
    about = "Submit the newest unprocessed commit of a branch for perf testing"
)]
struct Cli {
    /// Branch of the watched repository to follow.
    #[arg(short, long)]
    branch: String,
    /// Working directory holding config, history, logs, checkouts and results.
    #[arg(short = 'd', long = "working-directory", visible_alias = "dir")]
    working_directory: PathBuf,
    /// Log debug output to the console.
    #[arg(short, long)]
    verbose: bool,
    /// How many commits, tip included, to examine for a new one.
    #[arg(short = 'n', long, default_value_t = 1)]
    look_back: u32,
    /// Config file (default: `<working-directory>/rolling-perf.toml`).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let launched_at = Utc::now();
    let paths = WorkPaths::new(&cli.working_directory);

    let log_options = LogOptions {
        verbose: cli.verbose,
        log_file: Some(paths.invocation_log(&log_date_stamp(launched_at))),
    };
    if let Err(err) = logging::init(&log_options) {
        eprintln!("{err:#}");
        return ExitCode::from(exit_code_for(&err) as u8);
    }

    match run(cli, paths, launched_at) {
        Ok(outcome) => {
            match outcome.submitted() {
                Some(commit) => info!(commit = %commit, "submitted"),
                None => info!("no new commits to process"),
            }
            ExitCode::from(exit_codes::OK as u8)
        }
        Err(err) => {
            if is_fatal(&err) {
                error!("{err:#}");
            } else {
                error!("unhandled error: {err:?}");
            }
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

fn run(cli: Cli, paths: WorkPaths, launched_at: chrono::DateTime<Utc>) -> Result<RunOutcome> {
    let config_path = cli.config.unwrap_or_else(|| paths.config_path.clone());
    let config = load_config(&config_path)?;
    let ctx = RunContext::new(paths, config, cli.branch, cli.look_back, launched_at)?;
    info!("{}", ctx.launch_banner());

    let watched = GitRepo::new(ctx.config.repo.url.clone(), ctx.watched_repo_dir())
        .with_fresh_clone(ctx.config.repo.fresh_clone);
    let mut walker = CommitWalker::new(watched);
    let support: Vec<SupportRepo<GitRepo>> = ctx
        .config
        .support_repos
        .iter()
        .map(|repo| SupportRepo {
            name: repo.name.clone(),
            branch: repo.branch.clone(),
            repo: GitRepo::new(repo.url.clone(), ctx.paths.repo_dir(&repo.name))
                .with_fresh_clone(repo.fresh_clone),
        })
        .collect();
    let mut history = HistoryStore::new(ctx.paths.store_path.clone());

    let builder = CommandBuilder::new(ctx.config.build.clone());
    let tests = CommandTestRunner::new(ctx.config.tests.clone());
    let uploader = CommandUploader::new(ctx.config.upload.clone());
    run_once(
        &ctx,
        &CommandToolInstaller,
        &mut walker,
        &support,
        &mut history,
        &Collaborators {
            builder: &builder,
            tests: &tests,
            uploader: &uploader,
        },
    )
}
