//! Commit batching, per-file commit messages, and commit outcomes.
//!
//! Create/update operations are batched into a single capability call; each
//! delete is its own call. Outcomes are reported per file and folded into an
//! overall success flag (the AND of every file).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FileAction, FilePath, IssueContext, OperationSet};

// ---------------------------------------------------------------------------
// Commit messages
// ---------------------------------------------------------------------------

/// `Propose solution for issue #<n>: <title>`.
pub fn base_commit_message(issue: &IssueContext) -> String {
    format!("Propose solution for issue #{}: {}", issue.number, issue.title)
}

/// Message for the `index`-th (zero-based) file of a batch of `total`.
///
/// A single-file batch uses the base message unchanged.
pub fn batch_commit_message(base: &str, index: usize, total: usize, path: &FilePath) -> String {
    if total <= 1 {
        base.to_string()
    } else {
        format!("{base} (file {}/{total}: {})", index + 1, path.base_name())
    }
}

/// Message for deleting `path`.
pub fn delete_commit_message(base: &str, path: &FilePath) -> String {
    format!("{base} (delete {path})")
}

// ---------------------------------------------------------------------------
// Commit plan
// ---------------------------------------------------------------------------

/// One file of a batched create/update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Target path.
    pub file_path: FilePath,
    /// Complete new content.
    pub file_content: String,
}

/// The capability calls needed to apply a finalized operation set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    /// One delete call per path, in proposal order.
    pub deletes: Vec<FilePath>,
    /// A single batched create/update call, in proposal order.
    pub upserts: Vec<FileChange>,
}

impl CommitPlan {
    /// Splits `operations` into deletes and the upsert batch. No-change
    /// markers are dropped.
    pub fn from_operations(operations: &OperationSet) -> Self {
        let mut plan = Self::default();
        for op in operations {
            match &op.action {
                FileAction::Modify { code } => plan.upserts.push(FileChange {
                    file_path: op.file_path.clone(),
                    file_content: code.clone(),
                }),
                FileAction::Delete => plan.deletes.push(op.file_path.clone()),
                FileAction::NoChange => {}
            }
        }
        plan
    }

    /// `true` if there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty()
    }

    /// Every path the plan touches, deletes first.
    pub fn paths(&self) -> impl Iterator<Item = &FilePath> {
        self.deletes
            .iter()
            .chain(self.upserts.iter().map(|change| &change.file_path))
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of committing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// The change landed on the branch.
    Success,
    /// The remote rejected the change.
    Failed,
    /// The change was never attempted.
    Skipped,
}

impl CommitStatus {
    /// The status tag used in capability payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "success" | "deleted" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Per-file commit result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Affected path.
    pub file_path: FilePath,
    /// What happened.
    pub status: CommitStatus,
    /// Commit SHA, failure message, or skip reason.
    pub detail: String,
}

impl CommitOutcome {
    /// Reads one entry of a `commit_files_to_branch` `details` array.
    pub fn from_detail(entry: &Value) -> Option<Self> {
        let file_path = entry.get("file_path").and_then(Value::as_str).and_then(FilePath::new)?;
        let status = entry.get("status").and_then(Value::as_str).and_then(CommitStatus::parse)?;
        let detail = ["commit_sha", "detail", "error"]
            .iter()
            .find_map(|key| entry.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        Some(Self {
            file_path,
            status,
            detail,
        })
    }

    /// Reads a `delete_file` capability payload for `path`.
    pub fn from_delete_payload(path: FilePath, payload: &Value) -> Self {
        match payload.get("error") {
            Some(error) => Self {
                file_path: path,
                status: CommitStatus::Failed,
                detail: error.as_str().map_or_else(|| error.to_string(), str::to_string),
            },
            None => Self {
                file_path: path,
                status: CommitStatus::Success,
                detail: payload
                    .get("commit_sha")
                    .and_then(Value::as_str)
                    .unwrap_or("deleted")
                    .to_string(),
            },
        }
    }

    /// A skipped outcome with a reason.
    pub fn skipped(file_path: FilePath, reason: impl Into<String>) -> Self {
        Self {
            file_path,
            status: CommitStatus::Skipped,
            detail: reason.into(),
        }
    }
}

/// The parts of a `commit_files_to_branch` payload the commit stage reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchCommitResult {
    /// One entry per requested file; absent when the batch was rejected
    /// before any file was attempted.
    #[serde(default)]
    pub details: Option<Vec<Value>>,
    /// Set when any file failed or the batch was rejected.
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything the commit stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    /// Per-file results, in plan order (deletes first).
    pub outcomes: Vec<CommitOutcome>,
    /// Set when the stage was not attempted at all.
    pub not_attempted: Option<String>,
}

impl CommitReport {
    /// A stage that never ran.
    pub fn not_attempted(reason: impl Into<String>) -> Self {
        Self {
            outcomes: Vec::new(),
            not_attempted: Some(reason.into()),
        }
    }

    /// Pairs every planned path with a reported outcome. Paths the committer
    /// never reported on are recorded as skipped.
    pub fn reconcile(plan: &CommitPlan, reported: Vec<CommitOutcome>) -> Self {
        let mut remaining = reported;
        let outcomes = plan
            .paths()
            .map(|path| match remaining.iter().position(|o| &o.file_path == path) {
                Some(index) => remaining.remove(index),
                None => CommitOutcome::skipped(path.clone(), "no result reported by the committer"),
            })
            .collect();
        Self {
            outcomes,
            not_attempted: None,
        }
    }

    /// AND of every outcome; `false` when nothing was attempted.
    pub fn overall_success(&self) -> bool {
        self.not_attempted.is_none()
            && !self.outcomes.is_empty()
            && self.outcomes.iter().all(|o| o.status == CommitStatus::Success)
    }
}
