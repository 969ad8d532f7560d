//! Shared types for commit identity and processing history.
//!
//! These types define the stable contracts between the walker, the
//! submission pipeline and the history store.

use std::fmt;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

static COMMIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Opaque, immutable revision identifier.
///
/// Commit ids name directories under `results/`, so they are restricted to a
/// single safe path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("commit id must not be empty"));
        }
        if trimmed.len() > 128 {
            return Err(anyhow!("commit id is too long ({} chars)", trimmed.len()));
        }
        if !COMMIT_ID_RE.is_match(trimmed) || trimmed.contains("..") {
            return Err(anyhow!("commit id must be [A-Za-z0-9._-] only (got '{trimmed}')"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log messages.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CommitId> for String {
    fn from(value: CommitId) -> Self {
        value.0
    }
}

/// Persisted record for one processed commit (value side of `store.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Epoch seconds at which processing began.
    pub processed_at: f64,
    /// Local wall-clock rendering of `processed_at`.
    pub processed_at_human: String,
    /// Normalized commit timestamp (`YYYY-MM-DDTHH:MM:SSZ`), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<String>,
}

/// Output of a completed submission; becomes the commit's history record.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub commit_id: CommitId,
    pub processed_at: f64,
    pub processed_at_human: String,
    pub committed_at: Option<String>,
}

impl SubmissionRecord {
    pub fn to_commit_record(&self) -> CommitRecord {
        CommitRecord {
            processed_at: self.processed_at,
            processed_at_human: self.processed_at_human.clone(),
            committed_at: self.committed_at.clone(),
        }
    }
}
