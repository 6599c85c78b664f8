//! Run stages.

use serde::{Deserialize, Serialize};

/// Where a run is in the fixed stage sequence.
///
/// `Idle → Triaged → Planned → FilesIdentified → {Proposing ⇄ Reviewing} →
/// BranchReady → Committed → Reported → Done`. `PartiallyReported` is the early
/// exit taken when file identification yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Triaged,
    Planned,
    FilesIdentified,
    Proposing,
    Reviewing,
    BranchReady,
    Committed,
    Reported,
    PartiallyReported,
    Done,
}

impl RunStage {
    /// Name used in span fields and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Triaged => "triaged",
            Self::Planned => "planned",
            Self::FilesIdentified => "files_identified",
            Self::Proposing => "proposing",
            Self::Reviewing => "reviewing",
            Self::BranchReady => "branch_ready",
            Self::Committed => "committed",
            Self::Reported => "reported",
            Self::PartiallyReported => "partially_reported",
            Self::Done => "done",
        }
    }

    /// `true` for the two stages a finished run can end in.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PartiallyReported)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
