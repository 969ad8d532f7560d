//! Commit walker: a cursor over the watched branch, from its tip backwards.

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::types::CommitId;
use crate::io::git::SourceRepo;

/// Owns the position of the watched checkout. No other component moves it.
#[derive(Debug)]
pub struct CommitWalker<R: SourceRepo> {
    repo: R,
    position: Option<CommitId>,
    steps_back: u32,
}

impl<R: SourceRepo> CommitWalker<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            position: None,
            steps_back: 0,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Number of successful `step_back` calls since the last refresh.
    pub fn steps_back(&self) -> u32 {
        self.steps_back
    }

    /// Sync the checkout to the remote tip of `branch` and position there.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn refresh(&mut self, branch: &str) -> Result<CommitId> {
        self.repo.sync(branch)?;
        let tip = self.repo.head_commit()?;
        info!(tip = %tip, "branch refreshed");
        self.position = Some(tip.clone());
        self.steps_back = 0;
        Ok(tip)
    }

    /// Commit the walker is positioned at.
    pub fn current(&self) -> Result<CommitId> {
        self.position
            .clone()
            .ok_or_else(|| anyhow!("commit walker used before refresh"))
    }

    /// Normalized (`YYYY-MM-DDTHH:MM:SSZ`) commit time of `commit`.
    pub fn timestamp_of(&self, commit: &CommitId) -> Result<String> {
        self.repo.commit_timestamp(commit)
    }

    /// Move to the `n`-th ancestor of the current position.
    ///
    /// Returns `None` (without moving) when history has fewer than `n` more
    /// commits. `n == 0` is a caller bug and always fails.
    #[instrument(skip_all, fields(n = n))]
    pub fn step_back(&mut self, n: u32) -> Result<Option<CommitId>> {
        if n < 1 {
            bail!("step_back requires n >= 1 (got {n})");
        }
        let from = self.current()?;
        let Some(target) = self.repo.ancestor(n)? else {
            debug!(from = %from, "reached the start of history");
            return Ok(None);
        };
        self.repo.rewind(n)?;
        let head = self.repo.head_commit()?;
        if head != target {
            bail!("rewind from {from} by {n} landed on {head}, expected {target}");
        }
        debug!(from = %from, to = %head, "stepped back");
        self.position = Some(head.clone());
        self.steps_back += n;
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRepo;

    fn ids(raw: &[&str]) -> Vec<CommitId> {
        raw.iter()
            .map(|id| CommitId::parse(id).expect("commit id"))
            .collect()
    }

    #[test]
    fn current_before_refresh_is_an_error() {
        let walker = CommitWalker::new(FakeRepo::linear("/repo", &["c3", "c2", "c1"]));
        assert!(walker.current().is_err());
    }

    #[test]
    fn walks_from_tip_backwards() {
        let repo = FakeRepo::linear("/repo", &["c3", "c2", "c1"]);
        let mut walker = CommitWalker::new(repo.clone());

        let tip = walker.refresh("main").expect("refresh");
        assert_eq!(tip, ids(&["c3"])[0]);
        assert_eq!(repo.synced_branches(), vec!["main".to_string()]);

        let mut seen = vec![walker.current().expect("current")];
        while let Some(next) = walker.step_back(1).expect("step back") {
            seen.push(next);
        }
        assert_eq!(seen, ids(&["c3", "c2", "c1"]));
        assert_eq!(walker.steps_back(), 2);
        assert_eq!(walker.current().expect("current"), ids(&["c1"])[0]);
    }

    #[test]
    fn step_back_by_several() {
        let mut walker = CommitWalker::new(FakeRepo::linear("/repo", &["c4", "c3", "c2", "c1"]));
        walker.refresh("main").expect("refresh");
        assert_eq!(
            walker.step_back(3).expect("step"),
            Some(ids(&["c1"])[0].clone())
        );
        assert_eq!(walker.step_back(1).expect("step"), None);
        assert_eq!(walker.steps_back(), 3);
    }

    #[test]
    fn step_back_zero_fails() {
        let mut walker = CommitWalker::new(FakeRepo::linear("/repo", &["c2", "c1"]));
        walker.refresh("main").expect("refresh");
        let err = walker.step_back(0).unwrap_err();
        assert!(err.to_string().contains("n >= 1"));
        assert_eq!(walker.current().expect("current"), ids(&["c2"])[0]);
    }

    #[test]
    fn refresh_resets_position_to_new_tip() {
        let repo = FakeRepo::linear("/repo", &["c2", "c1"]);
        let mut walker = CommitWalker::new(repo.clone());
        walker.refresh("main").expect("refresh");
        walker.step_back(1).expect("step");

        repo.push_commit("c3");
        let tip = walker.refresh("main").expect("refresh again");
        assert_eq!(tip, ids(&["c3"])[0]);
        assert_eq!(walker.steps_back(), 0);
    }

    #[test]
    fn timestamp_of_delegates_to_repo() {
        let mut walker = CommitWalker::new(FakeRepo::linear("/repo", &["c1"]));
        walker.refresh("main").expect("refresh");
        let stamp = walker.timestamp_of(&ids(&["c1"])[0]).expect("timestamp");
        assert_eq!(stamp, "2024-01-01T00:00:00Z");
    }
}
