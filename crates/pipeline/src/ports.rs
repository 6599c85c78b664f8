//! Port traits implemented by the infrastructure crates.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`RepositoryHost`] | `github::GithubClient` |
//! | [`AgentRuntime`] | `llm::AnthropicRuntime` |
//!
//! Both are object safe and used as `Arc<dyn _>` so the executor and the
//! capability functions receive an explicitly constructed instance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    AgentError, BranchCreation, BranchName, CommentId, CommitSha, FilePath, HostError, Invocation,
    IssueContext, IssueNumber, RepositoryRef, RoleAgent,
};

// ---------------------------------------------------------------------------
// Host payloads
// ---------------------------------------------------------------------------

/// An issue as returned by the host, with triage-only metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    /// Fields every stage consumes.
    #[serde(flatten)]
    pub issue: IssueContext,
    /// Login of the author.
    pub author: Option<String>,
    /// `open` or `closed`.
    pub state: Option<String>,
    /// Number of comments.
    pub comments: u64,
    /// RFC 3339 creation time.
    pub created_at: Option<String>,
    /// RFC 3339 last-update time.
    pub updated_at: Option<String>,
}

/// A decoded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Path that was requested.
    pub file_path: FilePath,
    /// UTF-8 content.
    pub content: String,
    /// Blob SHA.
    pub sha: CommitSha,
}

/// Metadata of a commit produced by a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// SHA of the new commit.
    pub commit_sha: Option<CommitSha>,
    /// Browser URL of the new commit.
    pub commit_url: Option<String>,
    /// `true` if the write created the file rather than updating it.
    pub created: bool,
}

/// A posted issue comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInfo {
    /// Comment id.
    pub id: CommentId,
    /// Browser URL of the comment.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// The remote version-control host.
///
/// Every failure, transport failures included, is returned as a
/// [`HostError`]; implementations never panic on remote misbehaviour.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Fetches an issue.
    async fn get_issue_details(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<IssueDetails, HostError>;

    /// The repository's default branch.
    async fn get_default_branch(&self, repo: &RepositoryRef) -> Result<BranchName, HostError>;

    /// Head commit of `branch`.
    async fn get_latest_commit_sha(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<CommitSha, HostError>;

    /// Creates `new_branch` at the head of `base_branch`. An existing branch is
    /// reported as [`BranchCreation::AlreadyExists`], not as an error.
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        new_branch: &BranchName,
        base_branch: &BranchName,
    ) -> Result<BranchCreation, HostError>;

    /// Blob SHA of `path` on `branch`, or `None` if it does not exist.
    async fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<Option<CommitSha>, HostError>;

    /// Decoded content of `path` on `branch`.
    ///
    /// Directories and non-file entries fail with `is_directory` and
    /// `not_a_file` respectively.
    async fn get_file_content(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileContent, HostError>;

    /// Creates or replaces `path` on `branch`.
    ///
    /// Looks up the current SHA first and writes conditionally on it. The
    /// lookup and the write are two requests: a concurrent external edit
    /// between them makes the write fail with a conflict (or clobber a file
    /// created in between). Runs assume exclusive ownership of their branch.
    async fn create_or_update_file(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        path: &FilePath,
        content: &str,
        message: &str,
    ) -> Result<CommitInfo, HostError>;

    /// Deletes `path` from `branch`; `file_not_found` if it is absent.
    async fn delete_file(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        path: &FilePath,
        message: &str,
    ) -> Result<CommitInfo, HostError>;

    /// Every blob path reachable from the head of `branch`, in tree order.
    async fn list_files_recursive(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Vec<FilePath>, HostError>;

    /// Posts a comment on an issue.
    async fn add_issue_comment(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentInfo, HostError>;

    /// `true` if a credential is configured. Write operations fail with
    /// `unauthenticated` without one.
    fn is_authenticated(&self) -> bool;
}

/// Runs a role agent against a model.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs `agent` on `input` until the model produces a final answer,
    /// executing any capability calls it makes along the way.
    async fn invoke(&self, agent: &RoleAgent, input: &str) -> Result<Invocation, AgentError>;
}
