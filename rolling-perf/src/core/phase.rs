//! Run controller phases and scan events.

use std::fmt;

use crate::core::types::CommitId;

/// Lifecycle of one invocation.
///
/// `Init -> Syncing -> Scanning -> (Submitting) -> Done`; any failure moves to
/// the terminal `Failed` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Syncing,
    Scanning,
    Submitting,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::Syncing => "syncing",
            RunPhase::Scanning => "scanning",
            RunPhase::Submitting => "submitting",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One evaluated scan position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// The commit already has a history record; scanning continues.
    AlreadyProcessed(CommitId),
    /// The commit is new and was handed to the submission pipeline.
    Submitted(CommitId),
}

/// Why scanning stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// A new commit was found and submitted.
    Submitted,
    /// `look_back` positions were examined without finding a new commit.
    LookBackExhausted,
    /// The root commit was reached before the look-back budget ran out.
    HistoryExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_and_failed_are_terminal() {
        let terminal: Vec<RunPhase> = [
            RunPhase::Init,
            RunPhase::Syncing,
            RunPhase::Scanning,
            RunPhase::Submitting,
            RunPhase::Done,
            RunPhase::Failed,
        ]
        .into_iter()
        .filter(|phase| phase.is_terminal())
        .collect();
        assert_eq!(terminal, vec![RunPhase::Done, RunPhase::Failed]);
    }
}
