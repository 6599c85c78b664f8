//! Branch naming policy and branch-stage state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BranchName, IssueNumber};

/// Branch name prefix chosen from the issue's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPrefix {
    /// Any label containing "enhancement".
    Feature,
    /// Any label containing "chore" (and none containing "enhancement").
    Chore,
    /// Everything else.
    Fix,
}

impl BranchPrefix {
    /// Selects the prefix by label keyword. `enhancement` is checked before
    /// `chore`; the first match wins. Matching is case-insensitive containment.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a String>) -> Self {
        let folded: Vec<String> = labels.into_iter().map(|l| l.to_lowercase()).collect();
        if folded.iter().any(|l| l.contains("enhancement")) {
            Self::Feature
        } else if folded.iter().any(|l| l.contains("chore")) {
            Self::Chore
        } else {
            Self::Fix
        }
    }

    /// The prefix as it appears in branch names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Chore => "chore",
            Self::Fix => "fix",
        }
    }
}

impl std::fmt::Display for BranchPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<prefix>/issue-<number>`.
pub fn branch_name_for(prefix: BranchPrefix, number: IssueNumber) -> BranchName {
    BranchName(format!("{prefix}/issue-{number}"))
}

/// The deterministic branch name for an issue's labels and number.
pub fn ideal_branch_name(labels: &BTreeSet<String>, number: IssueNumber) -> BranchName {
    branch_name_for(BranchPrefix::from_labels(labels), number)
}

// ---------------------------------------------------------------------------

/// How the remote answered a branch-creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCreation {
    /// A new ref was created.
    Created,
    /// The ref was already there. Not an error.
    AlreadyExists,
}

impl BranchCreation {
    /// The status tag used in capability payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
        }
    }
}

/// Outcome of the branch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    /// Name computed from labels and issue number.
    pub ideal: BranchName,
    /// Name the remote reported, which may differ from `ideal`.
    pub actual: BranchName,
    /// Whether the branch is usable for commits.
    pub success: bool,
    /// Whether the branch existed before this run.
    pub already_exists: bool,
    /// Why creation failed: the capability's error or the agent's summary.
    pub detail: Option<String>,
}

/// Words that, in a branch-creator summary, indicate the branch is usable.
const AFFIRMATIVE_BRANCH_WORDS: &[&str] = &["created", "already exists", "exists", "success"];

/// Words that turn a summary into a failure report regardless of any
/// affirmative word it also contains.
const NEGATING_BRANCH_WORDS: &[&str] = &[
    "not", "no", "never", "cannot", "can't", "couldn't", "unable", "failed", "fail", "failure",
    "error", "denied",
];

fn is_negated(folded: &str) -> bool {
    folded
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .any(|word| NEGATING_BRANCH_WORDS.contains(&word))
}

impl BranchState {
    /// A failed branch stage.
    pub fn failed(ideal: BranchName, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            actual: ideal.clone(),
            ideal,
            success: false,
            already_exists: false,
            detail: Some(detail.trim().to_string()).filter(|d| !d.is_empty()),
        }
    }

    /// Interprets a `create_pr_branch` capability payload.
    ///
    /// Returns `None` when the payload carries neither a recognised status nor
    /// an error, so the caller can fall back to the agent's summary.
    pub fn from_payload(ideal: BranchName, payload: &Value) -> Option<Self> {
        if let Some(error) = payload.get("error") {
            let detail = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            return Some(Self::failed(ideal, detail));
        }
        let creation = match payload.get("status").and_then(Value::as_str)? {
            "created" => BranchCreation::Created,
            "already_exists" => BranchCreation::AlreadyExists,
            _ => return None,
        };
        let actual = payload
            .get("branch_name")
            .and_then(Value::as_str)
            .and_then(BranchName::new)
            .unwrap_or_else(|| ideal.clone());
        Some(Self {
            ideal,
            actual,
            success: true,
            already_exists: creation == BranchCreation::AlreadyExists,
            detail: None,
        })
    }

    /// Fallback used when no capability payload could be interpreted: scans
    /// the agent's free-text summary for an affirmative state word. Any
    /// negation in the summary makes it a failure.
    pub fn from_summary(ideal: BranchName, summary: &str) -> Self {
        let folded = summary.to_lowercase();
        if is_negated(&folded) || !AFFIRMATIVE_BRANCH_WORDS.iter().any(|w| folded.contains(w)) {
            return Self::failed(ideal, summary);
        }
        Self {
            actual: ideal.clone(),
            ideal,
            success: true,
            already_exists: folded.contains("exists"),
            detail: None,
        }
    }
}
