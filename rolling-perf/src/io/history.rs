//! Durable processing history (`store.json`).
//!
//! The store maps commit ids to [`CommitRecord`]s. It is loaded lazily on first
//! access, kept in memory for the rest of the invocation, and rewritten in full
//! (temp file + rename) after every insertion. An insertion only becomes
//! visible in memory once the write has succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::{CommitId, CommitRecord};
use crate::io::atomic::write_atomic;

type Records = BTreeMap<CommitId, CommitRecord>;

/// Lazily loaded, write-through history of processed commits.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    records: Option<Records>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: None,
        }
    }

    /// True iff `commit` has a record. Loads the store on first call.
    pub fn has(&mut self, commit: &CommitId) -> Result<bool> {
        Ok(self.records()?.contains_key(commit))
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    /// Insert or overwrite the record for `commit` and persist the whole store.
    ///
    /// On a write failure the in-memory view is left unchanged.
    #[instrument(skip_all, fields(commit = %commit))]
    pub fn record(&mut self, commit: &CommitId, record: CommitRecord) -> Result<()> {
        let mut next = self.records()?.clone();
        let replaced = next.insert(commit.clone(), record).is_some();
        write_store(&self.path, &next)?;
        self.records = Some(next);
        info!(replaced, "recorded commit in history");
        Ok(())
    }

    fn records(&mut self) -> Result<&Records> {
        if self.records.is_none() {
            self.records = Some(load_store(&self.path)?);
        }
        Ok(self.records.get_or_insert_with(Records::new))
    }
}

fn load_store(path: &Path) -> Result<Records> {
    if !path.exists() {
        debug!(path = %path.display(), "no history yet, starting empty");
        return Ok(Records::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read history {}", path.display()))?;
    let records: Records = serde_json::from_str(&contents)
        .with_context(|| format!("parse history {}", path.display()))?;
    debug!(path = %path.display(), records = records.len(), "history loaded");
    Ok(records)
}

fn write_store(path: &Path, records: &Records) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(records).context("serialize history")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(raw: &str) -> CommitId {
        CommitId::parse(raw).expect("commit id")
    }

    fn record(at: f64) -> CommitRecord {
        CommitRecord {
            processed_at: at,
            processed_at_human: format!("t={at}"),
            committed_at: None,
        }
    }

    #[test]
    fn missing_store_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = HistoryStore::new(temp.path().join("store.json"));
        assert!(!store.has(&commit("abc123")).expect("has"));
        assert_eq!(store.len().expect("len"), 0);
        assert!(!temp.path().join("store.json").exists());
    }

    /// A recorded commit is still present after reloading from disk.
    #[test]
    fn record_survives_restart() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");

        let mut store = HistoryStore::new(&path);
        store.record(&commit("abc123"), record(1.5)).expect("record");
        assert!(store.has(&commit("abc123")).expect("has"));

        let mut reloaded = HistoryStore::new(&path);
        assert!(reloaded.has(&commit("abc123")).expect("has"));
        assert_eq!(reloaded.len().expect("len"), 1);
    }

    #[test]
    fn last_write_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");

        let mut store = HistoryStore::new(&path);
        store.record(&commit("abc123"), record(1.0)).expect("first");
        store.record(&commit("abc123"), record(2.0)).expect("second");
        assert_eq!(store.len().expect("len"), 1);

        let mut reloaded = HistoryStore::new(&path);
        assert_eq!(reloaded.len().expect("len"), 1);
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"processed_at\": 2.0"), "{contents}");
    }

    #[test]
    fn creates_missing_parent_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/state/store.json");
        let mut store = HistoryStore::new(&path);
        store.record(&commit("abc123"), record(1.0)).expect("record");
        assert!(path.is_file());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        // A directory where the store file should go makes the rename fail.
        let path = temp.path().join("store.json");
        fs::create_dir_all(path.join("occupied")).expect("block store path");

        let mut store = HistoryStore::new(&path);
        store.records = Some(Records::new());
        assert!(store.record(&commit("abc123"), record(1.0)).is_err());
        assert!(!store.has(&commit("abc123")).expect("has"));
    }

    #[test]
    fn store_format_is_indented_and_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");
        let mut store = HistoryStore::new(&path);
        store.record(&commit("bbb"), record(2.0)).expect("record");
        store.record(&commit("aaa"), record(1.0)).expect("record");

        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"aaa\": {\n    \"processed_at\": 1.0,\n    \"processed_at_human\": \"t=1\"\n  },\n  \"bbb\": {\n    \"processed_at\": 2.0,\n    \"processed_at_human\": \"t=2\"\n  }\n}\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn malformed_store_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");
        fs::write(&path, "{ not json").expect("write");
        let mut store = HistoryStore::new(&path);
        let err = store.has(&commit("abc123")).unwrap_err();
        assert!(format!("{err:#}").contains("parse history"));
    }
}
