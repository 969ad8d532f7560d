//! Rendering of configured command lines.
//!
//! Each argument of a configured command is a minijinja template rendered
//! against [`CommandVars`]. Unknown variables are an error so that typos in
//! the config fail loudly instead of producing empty arguments.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Variables available to command templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandVars {
    pub commit_id: String,
    pub repo_dir: String,
    pub working_dir: String,
    pub results_dir: String,
    pub runtime_id: Option<String>,
    /// Support repo name -> checkout path.
    pub repos: BTreeMap<String, String>,
}

/// Render every argument of `args` with `vars`.
pub fn render_command(args: &[String], vars: &CommandVars) -> Result<Vec<String>> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    args.iter()
        .map(|arg| {
            env.render_str(arg, vars)
                .with_context(|| format!("render command argument '{arg}'"))
        })
        .collect()
}
