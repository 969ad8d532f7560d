//! Naming convention for per-commit result artifacts.
//!
//! The perf runner writes files named `<commit_id>.<kind>` (for example
//! `abc123.test.xml`). Only configured kinds are published.

use crate::core::types::CommitId;

/// Artifact kinds to collect, as file-name suffixes after `<commit_id>.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKinds {
    kinds: Vec<String>,
}

impl ArtifactKinds {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds = kinds
            .into_iter()
            .map(Into::into)
            .map(|kind: String| kind.trim_start_matches('.').to_string())
            .filter(|kind| !kind.is_empty())
            .collect();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// True if `file_name` is an artifact of `commit` with a configured kind.
    pub fn matches(&self, commit: &CommitId, file_name: &str) -> bool {
        let Some(rest) = file_name
            .strip_prefix(commit.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            return false;
        };
        self.kinds.iter().any(|kind| kind == rest)
    }
}

impl Default for ArtifactKinds {
    fn default() -> Self {
        Self::new(["test.csv", "test.xml"])
    }
}
