//! Core orchestration domain for Octopilot.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, and error type used by the issue-resolution pipeline, together with
//! the port traits the infrastructure crates implement. Infrastructure crates
//! never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`IssueNumber`, `BranchName`, `FilePath`, ...) |
//! | [`types`] | Shared value types (`TokenCount`, `TokenUsage`, `Timestamp`) |
//! | [`errors`] | `PipelineError`, `HostError`, `AgentError`, `RetryPolicy` |
//! | [`issue`] | `RepositoryRef`, `IssueContext`, issue URL parsing |
//! | [`operations`] | `FileOperation`, `OperationSet` |
//! | [`markdown`] | The markdown operation grammar |
//! | [`review`] | `ReviewVerdict` and approval keywords |
//! | [`branch`] | Branch naming policy and `BranchState` |
//! | [`commit`] | `CommitPlan`, commit messages, `CommitOutcome` |
//! | [`snapshot`] | `OriginalFileSnapshot` |
//! | [`report`] | `RunReport` |
//! | [`agent`] | `RoleAgent`, `Capability`, `Invocation` and its trace |
//! | [`ports`] | `RepositoryHost`, `AgentRuntime` |
//! | [`config`] | `RunConfig` |
//! | [`stage`] | `RunStage` |

pub mod agent;
pub mod branch;
pub mod commit;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod issue;
pub mod markdown;
pub mod operations;
pub mod ports;
pub mod report;
pub mod review;
pub mod snapshot;
pub mod stage;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use agent::{Capability, Invocation, InvocationTrace, RoleAgent, TraceStep};
pub use branch::{branch_name_for, ideal_branch_name, BranchCreation, BranchPrefix, BranchState};
pub use commit::{
    base_commit_message, batch_commit_message, delete_commit_message, BatchCommitResult,
    CommitOutcome, CommitPlan, CommitReport, CommitStatus, FileChange,
};
pub use config::{RunConfig, DEFAULT_MAX_REVIEW_CYCLES, DEFAULT_MODEL};
pub use errors::{
    AgentError, AgentErrorKind, HostError, HostErrorStatus, PipelineError, RetryPolicy,
};
pub use identifiers::{BranchName, CommentId, CommitSha, FilePath, IssueNumber, ModelId, PipelineRunId};
pub use issue::{parse_issue_url, IssueContext, RepositoryRef};
pub use markdown::parse_operations;
pub use operations::{FileAction, FileOperation, OperationSet};
pub use ports::{AgentRuntime, CommentInfo, CommitInfo, FileContent, IssueDetails, RepositoryHost};
pub use report::{ChangeExplanation, ReviewOutcome, ReviewSummary, RunReport};
pub use review::{is_satisfied, ReviewAspect, ReviewVerdict};
pub use snapshot::{
    proposed_text, AbsentReason, OriginalFile, OriginalFileSnapshot, DELETED_PLACEHOLDER,
    NEW_FILE_PLACEHOLDER, UNAVAILABLE_PLACEHOLDER,
};
pub use stage::RunStage;
pub use types::{Timestamp, TokenCount, TokenUsage};
