//! Canonical layout of the working directory.
//!
//! ```text
//! <working-directory>/
//!   rolling-perf.toml        default config location
//!   store.json               processing history
//!   logs/                    invocation and subprocess logs
//!   repos/<name>/            source checkouts
//!   results/new/<commit>/    published artifacts
//!   results/temp/<commit>/   staging (transient)
//! ```

use std::path::PathBuf;

use crate::core::types::CommitId;

pub const CONFIG_FILE_NAME: &str = "rolling-perf.toml";

/// All canonical paths within the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    pub logs_dir: PathBuf,
    pub repos_dir: PathBuf,
    pub results_dir: PathBuf,
    pub published_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl WorkPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let results_dir = root.join("results");
        Self {
            config_path: root.join(CONFIG_FILE_NAME),
            store_path: root.join("store.json"),
            logs_dir: root.join("logs"),
            repos_dir: root.join("repos"),
            published_dir: results_dir.join("new"),
            staging_dir: results_dir.join("temp"),
            results_dir,
            root,
        }
    }

    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.repos_dir.join(name)
    }

    pub fn published_for(&self, commit: &CommitId) -> PathBuf {
        self.published_dir.join(commit.as_str())
    }

    pub fn staging_for(&self, commit: &CommitId) -> PathBuf {
        self.staging_dir.join(commit.as_str())
    }

    /// Per-invocation log file, `logs/<YYYYMMDD>.log`.
    pub fn invocation_log(&self, date_stamp: &str) -> PathBuf {
        self.logs_dir.join(format!("{date_stamp}.log"))
    }

    /// Per-subprocess log file, `logs/<YYYYMMDD>.<commit>.<step>.log`.
    pub fn step_log(&self, date_stamp: &str, commit: &CommitId, step: &str) -> PathBuf {
        self.logs_dir.join(format!("{date_stamp}.{commit}.{step}.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let paths = WorkPaths::new("/work");
        let commit = CommitId::parse("abc123").expect("commit");

        assert_eq!(paths.store_path, PathBuf::from("/work/store.json"));
        assert_eq!(paths.config_path, PathBuf::from("/work/rolling-perf.toml"));
        assert_eq!(
            paths.published_for(&commit),
            PathBuf::from("/work/results/new/abc123")
        );
        assert_eq!(
            paths.staging_for(&commit),
            PathBuf::from("/work/results/temp/abc123")
        );
        assert_eq!(
            paths.step_log("20240301", &commit, "build"),
            PathBuf::from("/work/logs/20240301.abc123.build.log")
        );
        assert_eq!(
            paths.invocation_log("20240301"),
            PathBuf::from("/work/logs/20240301.log")
        );
        assert_eq!(paths.repo_dir("cli"), PathBuf::from("/work/repos/cli"));
    }
}
