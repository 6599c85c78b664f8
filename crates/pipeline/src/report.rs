//! The issue comment that summarises a run.
//!
//! [`RunReport`] accumulates stage outputs as the executor advances and
//! renders them as one markdown document. A run that stops early renders the
//! sections it reached plus an `Outcome` section explaining why it stopped.

use serde::{Deserialize, Serialize};

use crate::{
    BranchState, CommitReport, FileAction, FilePath, IssueContext, OperationSet, RepositoryRef,
    ReviewAspect, ReviewVerdict, TokenUsage,
};

/// An explanation of one committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeExplanation {
    /// The operation's path.
    pub file_path: FilePath,
    /// The operation's action.
    pub action: FileAction,
    /// Explainer output.
    pub explanation: String,
}

/// Why the propose/review loop stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// The first proposal held no file changes, so nothing was reviewed.
    #[default]
    Skipped,
    /// Both reviewers were satisfied.
    Approved,
    /// The attempt budget ran out; the last proposal is used as is.
    CyclesExhausted,
    /// A revision held no recognisable operations; the previously reviewed
    /// proposal is kept.
    RevisionUnusable,
    /// A revision replaced every change with no-change markers.
    ChangesWithdrawn,
}

impl ReviewOutcome {
    /// One-line explanation for the report.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Skipped => "Review skipped: no file changes were proposed.",
            Self::Approved => "Both reviewers approved the final proposal.",
            Self::CyclesExhausted => {
                "Review cycles were exhausted; the last proposal is used as a best effort."
            }
            Self::RevisionUnusable => {
                "The last revision contained no recognisable file operations; the previously reviewed proposal is used."
            }
            Self::ChangesWithdrawn => {
                "The reviser withdrew all changes after review; nothing is committed."
            }
        }
    }
}

/// How the propose/review loop ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// Number of proposals made.
    pub attempts: u32,
    /// Why the loop stopped.
    pub outcome: ReviewOutcome,
    /// The last verdict of each reviewer; empty when nothing was reviewed.
    pub verdicts: Vec<ReviewVerdict>,
}

impl ReviewSummary {
    /// `true` if both reviewers were satisfied with the final set.
    pub fn approved(&self) -> bool {
        self.outcome == ReviewOutcome::Approved
    }
}

/// Accumulated state of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Repository the issue belongs to.
    pub repository: RepositoryRef,
    /// The triaged issue.
    pub issue: IssueContext,
    /// Triager free-text summary.
    pub triage_summary: String,
    /// Planner output.
    pub plan: Option<String>,
    /// Paths selected for proposal.
    pub identified_files: Vec<FilePath>,
    /// The finalized working set.
    pub operations: OperationSet,
    /// Per-operation explanations; empty if explanation was skipped.
    pub explanations: Vec<ChangeExplanation>,
    /// Review loop result; `None` if the loop never ran.
    pub review: Option<ReviewSummary>,
    /// Branch stage result.
    pub branch: Option<BranchState>,
    /// Commit stage result.
    pub commit: Option<CommitReport>,
    /// Token totals, rendered only when set.
    pub token_usage: Option<TokenUsage>,
    /// Why the run stopped early.
    pub early_exit: Option<String>,
}

impl RunReport {
    /// A report holding only the triage output.
    pub fn new(repository: RepositoryRef, issue: IssueContext, triage_summary: impl Into<String>) -> Self {
        Self {
            repository,
            issue,
            triage_summary: triage_summary.into(),
            plan: None,
            identified_files: Vec::new(),
            operations: OperationSet::default(),
            explanations: Vec::new(),
            review: None,
            branch: None,
            commit: None,
            token_usage: None,
            early_exit: None,
        }
    }

    /// `true` if the run stopped before proposing.
    pub fn is_partial(&self) -> bool {
        self.early_exit.is_some()
    }

    /// Renders the report as markdown.
    pub fn render(&self) -> String {
        let mut out = format!(
            "# Automated resolution for issue #{}: {}\n\n",
            self.issue.number, self.issue.title
        );

        section(&mut out, "Triage Summary", self.triage_summary.trim());
        section(
            &mut out,
            "Plan",
            self.plan.as_deref().map(str::trim).unwrap_or("No plan was produced."),
        );
        section(&mut out, "File Identification", &self.render_files());

        if let Some(reason) = &self.early_exit {
            section(&mut out, "Outcome", reason);
            self.render_usage(&mut out);
            return out.trim_end().to_string();
        }

        section(&mut out, "Proposed Changes", &self.render_changes());
        section(&mut out, "Reviews", &self.render_reviews());
        section(&mut out, "Commit Status", &self.render_commit());
        self.render_usage(&mut out);
        out.trim_end().to_string()
    }

    fn render_files(&self) -> String {
        if self.identified_files.is_empty() {
            return "No files were identified.".to_string();
        }
        self.identified_files
            .iter()
            .map(|p| format!("- `{p}`"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_changes(&self) -> String {
        if !self.explanations.is_empty() {
            return self
                .explanations
                .iter()
                .map(|e| {
                    format!(
                        "### `{}` ({})\n\n{}",
                        e.file_path,
                        e.action.label(),
                        e.explanation.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
        }
        if self.operations.is_empty() {
            "No changes were proposed.".to_string()
        } else {
            self.operations.render_markdown()
        }
    }

    fn render_reviews(&self) -> String {
        let Some(review) = &self.review else {
            return "Review did not run.".to_string();
        };
        if review.verdicts.is_empty() {
            return review.outcome.describe().to_string();
        }
        let mut out = format!(
            "Proposal attempts: {}. {}\n",
            review.attempts,
            review.outcome.describe()
        );
        for aspect in [ReviewAspect::Technical, ReviewAspect::Style] {
            if let Some(verdict) = review.verdicts.iter().find(|v| v.aspect == aspect) {
                out.push_str(&format!(
                    "\n### {}\n\n{}\n",
                    aspect.title(),
                    verdict.feedback.trim()
                ));
            }
        }
        out
    }

    fn render_commit(&self) -> String {
        let mut out = String::new();
        match &self.branch {
            Some(branch) if branch.success => {
                let state = if branch.already_exists { "already existed" } else { "created" };
                out.push_str(&format!("Branch: `{}` ({state})\n", branch.actual));
            }
            Some(branch) => {
                out.push_str(&format!("Branch: `{}` (creation failed)\n", branch.ideal));
                if let Some(detail) = &branch.detail {
                    out.push_str(&format!("\n> {}\n", detail.replace('\n', "\n> ")));
                }
            }
            None => out.push_str("Branch: not created\n"),
        }

        match &self.commit {
            Some(commit) => {
                if let Some(reason) = &commit.not_attempted {
                    out.push_str(&format!("\nCommit not attempted: {reason}\n"));
                }
                for outcome in &commit.outcomes {
                    out.push_str(&format!("- `{}`: {}", outcome.file_path, outcome.status.as_str()));
                    if !outcome.detail.is_empty() {
                        out.push_str(&format!(" ({})", outcome.detail));
                    }
                    out.push('\n');
                }
                if commit.not_attempted.is_none() {
                    let overall = if commit.overall_success() { "success" } else { "failed" };
                    out.push_str(&format!("\nOverall: {overall}\n"));
                }
            }
            None => out.push_str("\nCommit not attempted.\n"),
        }
        out
    }

    fn render_usage(&self, out: &mut String) {
        if let Some(usage) = &self.token_usage {
            section(
                out,
                "Token Usage",
                &format!(
                    "- Input tokens: {}\n- Output tokens: {}\n- Total tokens: {}\n- Model requests: {}",
                    usage.input,
                    usage.output,
                    usage.total(),
                    usage.requests
                ),
            );
        }
    }
}

fn section(out: &mut String, title: &str, body: &str) {
    out.push_str(&format!("## {title}\n\n{}\n\n", body.trim_end()));
}
