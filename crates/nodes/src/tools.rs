//! Capability functions bound to role agents.
//!
//! Each capability wraps the injected [`RepositoryHost`] behind an
//! agent-callable JSON signature. Results always come back as a JSON object:
//! failures carry `"error"` and `"status"` keys (see
//! [`HostError::to_payload`]) instead of being raised, so the model can read
//! them and the executor can mine them from the invocation trace.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use pipeline::{
    batch_commit_message, delete_commit_message, parse_issue_url, BranchCreation, BranchName,
    Capability, CommitStatus, FilePath, HostError, HostErrorStatus, IssueNumber, RepositoryHost,
    RepositoryRef,
};

/// `download_github_issue`
pub const DOWNLOAD_ISSUE: &str = "download_github_issue";
/// `list_repository_files`
pub const LIST_FILES: &str = "list_repository_files";
/// `get_file_content`
pub const GET_FILE_CONTENT: &str = "get_file_content";
/// `create_pr_branch`
pub const CREATE_BRANCH: &str = "create_pr_branch";
/// `commit_files_to_branch`
pub const COMMIT_FILES: &str = "commit_files_to_branch";
/// `delete_file`
pub const DELETE_FILE: &str = "delete_file";
/// `post_comment_to_github`
pub const POST_COMMENT: &str = "post_comment_to_github";

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

fn invalid_input(message: impl Into<String>) -> Value {
    HostError::new(HostErrorStatus::InvalidInput, message).to_payload()
}

fn decode_input<T: DeserializeOwned>(capability: &str, input: Value) -> Result<T, Value> {
    serde_json::from_value(input).map_err(|e| {
        warn!(capability, error = %e, "Capability called with malformed arguments");
        invalid_input(format!("Invalid arguments for {capability}: {e}"))
    })
}

fn repository(owner: &str, name: &str) -> Result<RepositoryRef, Value> {
    RepositoryRef::new(owner, name)
        .ok_or_else(|| invalid_input(format!("Invalid repository '{owner}/{name}'")))
}

fn branch(name: &str) -> Result<BranchName, Value> {
    BranchName::new(name).ok_or_else(|| invalid_input("Branch name must not be empty"))
}

fn file_path(path: &str) -> Result<FilePath, Value> {
    FilePath::new(path).ok_or_else(|| invalid_input("File path must not be empty"))
}

/// Collapses the `Result<Value, Value>` every capability body produces.
fn settle(result: Result<Value, Value>) -> Value {
    result.unwrap_or_else(|error| error)
}

// ---------------------------------------------------------------------------
// download_github_issue
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IssueUrlInput {
    issue_url: String,
}

/// Fetches an issue from its browser URL.
pub struct DownloadIssue {
    host: Arc<dyn RepositoryHost>,
}

impl DownloadIssue {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        let input: IssueUrlInput = decode_input(DOWNLOAD_ISSUE, input)?;
        let (repo, number) = parse_issue_url(&input.issue_url)
            .ok_or_else(|| invalid_input("Invalid GitHub issue URL format."))?;
        debug!(repository = %repo, issue = %number, "Fetching issue details");
        let details = self
            .host
            .get_issue_details(&repo, number)
            .await
            .map_err(|e| e.to_payload())?;
        serde_json::to_value(details).map_err(|e| invalid_input(e.to_string()))
    }
}

#[async_trait]
impl Capability for DownloadIssue {
    fn name(&self) -> &str {
        DOWNLOAD_ISSUE
    }

    fn description(&self) -> &str {
        "Fetches the details of a GitHub issue (number, title, body, labels, author, state, \
         comment count, timestamps) from its URL."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "issue_url": {"type": "string", "description": "Full URL of the GitHub issue"}
            },
            "required": ["issue_url"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// list_repository_files
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BranchInput {
    repo_owner: String,
    repo_name: String,
    branch: String,
}

/// Lists every file path on a branch.
pub struct ListRepositoryFiles {
    host: Arc<dyn RepositoryHost>,
}

impl ListRepositoryFiles {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        let input: BranchInput = decode_input(LIST_FILES, input)?;
        let repo = repository(&input.repo_owner, &input.repo_name)?;
        let branch = branch(&input.branch)?;
        let files = self
            .host
            .list_files_recursive(&repo, &branch)
            .await
            .map_err(|e| e.to_payload())?;
        Ok(json!({"files": files, "count": files.len()}))
    }
}

#[async_trait]
impl Capability for ListRepositoryFiles {
    fn name(&self) -> &str {
        LIST_FILES
    }

    fn description(&self) -> &str {
        "Lists all file paths in a repository branch. Useful for understanding the repository \
         structure before choosing files to modify."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_owner": {"type": "string"},
                "repo_name": {"type": "string"},
                "branch": {"type": "string"}
            },
            "required": ["repo_owner", "repo_name", "branch"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// get_file_content
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct FileInput {
    repo_owner: String,
    repo_name: String,
    file_path: String,
    branch: String,
}

/// Reads one file.
pub struct GetFileContent {
    host: Arc<dyn RepositoryHost>,
}

impl GetFileContent {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        let input: FileInput = decode_input(GET_FILE_CONTENT, input)?;
        let repo = repository(&input.repo_owner, &input.repo_name)?;
        let branch = branch(&input.branch)?;
        let path = file_path(&input.file_path)?;
        match self.host.get_file_content(&repo, &path, &branch).await {
            Ok(file) => Ok(json!({
                "file_path": file.file_path,
                "content": file.content,
                "sha": file.sha,
                "status": "success"
            })),
            Err(e) => {
                let mut payload = e.to_payload();
                payload["file_path"] = json!(path);
                payload["content"] = Value::Null;
                Err(payload)
            }
        }
    }
}

#[async_trait]
impl Capability for GetFileContent {
    fn name(&self) -> &str {
        GET_FILE_CONTENT
    }

    fn description(&self) -> &str {
        "Fetches the current content of one file on a branch. Directories and other non-file \
         paths are reported with a distinct status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_owner": {"type": "string"},
                "repo_name": {"type": "string"},
                "file_path": {"type": "string"},
                "branch": {"type": "string"}
            },
            "required": ["repo_owner", "repo_name", "file_path", "branch"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// create_pr_branch
// ---------------------------------------------------------------------------

fn default_prefix() -> String {
    "fix".to_string()
}

#[derive(Deserialize)]
struct CreateBranchInput {
    repo_owner: String,
    repo_name: String,
    issue_number: u64,
    base_branch: String,
    #[serde(default = "default_prefix")]
    branch_prefix: String,
}

/// Ensures `<prefix>/issue-<n>` exists.
pub struct CreatePrBranch {
    host: Arc<dyn RepositoryHost>,
}

impl CreatePrBranch {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        if !self.host.is_authenticated() {
            return Err(HostError::unauthenticated("create a branch").to_payload());
        }
        let input: CreateBranchInput = decode_input(CREATE_BRANCH, input)?;
        let repo = repository(&input.repo_owner, &input.repo_name)?;
        let base = branch(&input.base_branch)?;
        let prefix = input.branch_prefix.trim().trim_end_matches('/');
        let new_branch = branch(&format!(
            "{}/issue-{}",
            if prefix.is_empty() { "fix" } else { prefix },
            IssueNumber::new(input.issue_number)
        ))?;

        info!(branch = %new_branch, base = %base, "Ensuring branch exists");
        let creation = self
            .host
            .create_branch(&repo, &new_branch, &base)
            .await
            .map_err(|e| e.to_payload())?;
        let message = match creation {
            BranchCreation::Created => format!("Branch '{new_branch}' created successfully."),
            BranchCreation::AlreadyExists => format!("Branch '{new_branch}' already exists."),
        };
        Ok(json!({
            "status": creation.as_str(),
            "branch_name": new_branch,
            "message": message
        }))
    }
}

#[async_trait]
impl Capability for CreatePrBranch {
    fn name(&self) -> &str {
        CREATE_BRANCH
    }

    fn description(&self) -> &str {
        "Ensures a branch named <branch_prefix>/issue-<issue_number> exists, creating it from \
         base_branch if necessary. An existing branch is reported as already_exists."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_owner": {"type": "string"},
                "repo_name": {"type": "string"},
                "issue_number": {"type": "integer"},
                "base_branch": {"type": "string"},
                "branch_prefix": {"type": "string", "description": "e.g. fix, feature, chore", "default": "fix"}
            },
            "required": ["repo_owner", "repo_name", "issue_number", "base_branch"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// commit_files_to_branch
// ---------------------------------------------------------------------------

/// One entry of `file_changes_list`. Both fields are optional on the wire so
/// an incomplete entry is reported as skipped rather than failing the call.
#[derive(Deserialize)]
struct FileChangeInput {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    file_content: Option<String>,
}

#[derive(Deserialize)]
struct CommitFilesInput {
    repo_owner: String,
    repo_name: String,
    branch_name: String,
    commit_message: String,
    #[serde(default)]
    file_changes_list: Vec<FileChangeInput>,
}

/// Creates or updates several files, one commit per file.
pub struct CommitFilesToBranch {
    host: Arc<dyn RepositoryHost>,
}

impl CommitFilesToBranch {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        if !self.host.is_authenticated() {
            return Err(HostError::unauthenticated("commit files").to_payload());
        }
        let input: CommitFilesInput = decode_input(COMMIT_FILES, input)?;
        if input.file_changes_list.is_empty() {
            return Err(invalid_input("No file changes provided to commit."));
        }
        let repo = repository(&input.repo_owner, &input.repo_name)?;
        let branch = branch(&input.branch_name)?;

        let total = input.file_changes_list.len();
        let mut details = Vec::with_capacity(total);
        let mut all_succeeded = true;

        for (index, change) in input.file_changes_list.into_iter().enumerate() {
            let path = change.file_path.as_deref().and_then(FilePath::new);
            let (Some(path), Some(content)) = (path, change.file_content) else {
                all_succeeded = false;
                details.push(json!({
                    "file_path": change.file_path.unwrap_or_else(|| "Unknown".to_string()),
                    "status": CommitStatus::Skipped.as_str(),
                    "detail": "Missing file_path or file_content."
                }));
                continue;
            };

            let message = batch_commit_message(&input.commit_message, index, total, &path);
            debug!(path = %path, index = index + 1, total, "Committing file");
            match self
                .host
                .create_or_update_file(&repo, &branch, &path, &content, &message)
                .await
            {
                Ok(info) => details.push(json!({
                    "file_path": path,
                    "status": CommitStatus::Success.as_str(),
                    "commit_sha": info.commit_sha,
                    "commit_url": info.commit_url,
                    "created": info.created
                })),
                Err(e) => {
                    all_succeeded = false;
                    warn!(path = %path, error = %e, "File commit failed");
                    details.push(json!({
                        "file_path": path,
                        "status": CommitStatus::Failed.as_str(),
                        "detail": e.message,
                        "error_status": e.status.as_str()
                    }));
                }
            }
        }

        if all_succeeded {
            Ok(json!({"message": "All files committed successfully.", "details": details}))
        } else {
            Err(json!({
                "message": "Some files failed to commit or were skipped.",
                "details": details,
                "error": "One or more file commits failed."
            }))
        }
    }
}

#[async_trait]
impl Capability for CommitFilesToBranch {
    fn name(&self) -> &str {
        COMMIT_FILES
    }

    fn description(&self) -> &str {
        "Creates or updates a list of files on a branch, one commit per file, in list order. \
         commit_message is the base message; a per-file suffix is added when several files are \
         committed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_owner": {"type": "string"},
                "repo_name": {"type": "string"},
                "branch_name": {"type": "string"},
                "commit_message": {"type": "string"},
                "file_changes_list": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "file_path": {"type": "string"},
                            "file_content": {"type": "string", "description": "Complete new file content"}
                        },
                        "required": ["file_path", "file_content"]
                    }
                }
            },
            "required": ["repo_owner", "repo_name", "branch_name", "commit_message", "file_changes_list"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// delete_file
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DeleteFileInput {
    repo_owner: String,
    repo_name: String,
    branch_name: String,
    file_path: String,
    commit_message: String,
}

/// Deletes one file.
pub struct DeleteFile {
    host: Arc<dyn RepositoryHost>,
}

impl DeleteFile {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        let input: DeleteFileInput = decode_input(DELETE_FILE, input)?;
        let repo = repository(&input.repo_owner, &input.repo_name)?;
        let branch = branch(&input.branch_name)?;
        let path = file_path(&input.file_path)?;
        let message = delete_commit_message(&input.commit_message, &path);

        match self.host.delete_file(&repo, &branch, &path, &message).await {
            Ok(info) => Ok(json!({
                "status": "deleted",
                "file_path": path,
                "commit_sha": info.commit_sha,
                "commit_url": info.commit_url,
                "message": format!("Deleted {path}.")
            })),
            Err(e) => {
                warn!(path = %path, error = %e, "File delete failed");
                let mut payload = e.to_payload();
                payload["file_path"] = json!(path);
                Err(payload)
            }
        }
    }
}

#[async_trait]
impl Capability for DeleteFile {
    fn name(&self) -> &str {
        DELETE_FILE
    }

    fn description(&self) -> &str {
        "Deletes one file from a branch. commit_message is the base message; the deleted path is \
         appended to it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repo_owner": {"type": "string"},
                "repo_name": {"type": "string"},
                "branch_name": {"type": "string"},
                "file_path": {"type": "string"},
                "commit_message": {"type": "string"}
            },
            "required": ["repo_owner", "repo_name", "branch_name", "file_path", "commit_message"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------
// post_comment_to_github
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PostCommentInput {
    issue_url: String,
    comment_body: String,
}

/// Posts a markdown comment on an issue.
pub struct PostComment {
    host: Arc<dyn RepositoryHost>,
}

impl PostComment {
    /// Binds the capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self { host }
    }

    async fn run(&self, input: Value) -> Result<Value, Value> {
        if !self.host.is_authenticated() {
            return Err(HostError::unauthenticated("post a comment").to_payload());
        }
        let input: PostCommentInput = decode_input(POST_COMMENT, input)?;
        let (repo, number) = parse_issue_url(&input.issue_url)
            .ok_or_else(|| invalid_input("Invalid GitHub issue URL format."))?;
        let comment = self
            .host
            .add_issue_comment(&repo, number, &input.comment_body)
            .await
            .map_err(|e| e.to_payload())?;
        Ok(json!({
            "message": "Comment posted successfully.",
            "comment_id": comment.id,
            "url": comment.url
        }))
    }
}

#[async_trait]
impl Capability for PostComment {
    fn name(&self) -> &str {
        POST_COMMENT
    }

    fn description(&self) -> &str {
        "Posts a markdown comment to a GitHub issue."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "issue_url": {"type": "string"},
                "comment_body": {"type": "string", "description": "Markdown body of the comment"}
            },
            "required": ["issue_url", "comment_body"]
        })
    }

    async fn call(&self, input: Value) -> Value {
        settle(self.run(input).await)
    }
}

// ---------------------------------------------------------------------------

/// Every capability, bound to one host instance.
#[derive(Clone)]
pub struct Toolbox {
    /// `download_github_issue`
    pub download_issue: Arc<dyn Capability>,
    /// `list_repository_files`
    pub list_files: Arc<dyn Capability>,
    /// `get_file_content`
    pub get_file_content: Arc<dyn Capability>,
    /// `create_pr_branch`
    pub create_branch: Arc<dyn Capability>,
    /// `commit_files_to_branch`
    pub commit_files: Arc<dyn Capability>,
    /// `delete_file`
    pub delete_file: Arc<dyn Capability>,
    /// `post_comment_to_github`
    pub post_comment: Arc<dyn Capability>,
}

impl Toolbox {
    /// Binds every capability to `host`.
    pub fn new(host: Arc<dyn RepositoryHost>) -> Self {
        Self {
            download_issue: Arc::new(DownloadIssue::new(host.clone())),
            list_files: Arc::new(ListRepositoryFiles::new(host.clone())),
            get_file_content: Arc::new(GetFileContent::new(host.clone())),
            create_branch: Arc::new(CreatePrBranch::new(host.clone())),
            commit_files: Arc::new(CommitFilesToBranch::new(host.clone())),
            delete_file: Arc::new(DeleteFile::new(host.clone())),
            post_comment: Arc::new(PostComment::new(host)),
        }
    }
}
