//! [`RepositoryHost`] over the GitHub REST API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use pipeline::{
    BranchCreation, BranchName, CommentId, CommentInfo, CommitInfo, CommitSha, FileContent,
    FilePath, HostError, HostErrorStatus, IssueContext, IssueDetails, IssueNumber, RepositoryHost,
    RepositoryRef,
};

use crate::client::{decode, error_body, status_error, GithubClient};
use crate::models::{
    CommentRequest, CommentResponse, ContentEntry, ContentWriteResponse, CreateRefRequest,
    DeleteContentRequest, PutContentRequest, RefResponse, RepositoryResponse, TreeResponse,
};

impl GithubClient {
    /// Fetches a contents entry; `Ok(None)` when the path does not exist.
    async fn fetch_entry(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<Option<ContentEntry>, HostError> {
        let builder = self
            .request(Method::GET, &Self::contents_path(repo, path))
            .query(&[("ref", branch.as_str())]);
        let (status, body) = self.send(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, &body, &format!("Fetch contents of {path}")));
        }
        if body.is_array() {
            return Err(HostError::http(
                HostErrorStatus::IsDirectory,
                status.as_u16(),
                format!("Path is a directory: {path}"),
            ));
        }
        let entry: ContentEntry = decode(body, "Fetch contents")?;
        if entry.kind != "file" {
            return Err(HostError::http(
                HostErrorStatus::NotAFile,
                status.as_u16(),
                format!("Path is a {} rather than a file: {path}", entry.kind),
            ));
        }
        Ok(Some(entry))
    }
}

fn decode_content(path: &FilePath, entry: &ContentEntry) -> Result<String, HostError> {
    let raw = entry.content.as_deref().unwrap_or_default();
    if let Some(encoding) = entry.encoding.as_deref().filter(|e| *e != "base64") {
        if encoding == "none" || raw.is_empty() {
            // Files over 1 MB come back without inline content.
            return Err(HostError::new(
                HostErrorStatus::InvalidResponse,
                format!("Content of {path} is not inlined (encoding '{encoding}')"),
            ));
        }
        return Ok(raw.to_string());
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| {
        HostError::new(
            HostErrorStatus::InvalidResponse,
            format!("Content of {path} is not valid base64: {e}"),
        )
    })?;
    String::from_utf8(bytes).map_err(|_| {
        HostError::new(
            HostErrorStatus::InvalidResponse,
            format!("Content of {path} is not UTF-8 text"),
        )
    })
}

fn commit_info(response: ContentWriteResponse, created: bool) -> CommitInfo {
    CommitInfo {
        commit_sha: response.commit.sha.and_then(CommitSha::new),
        commit_url: response.commit.html_url,
        created,
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl RepositoryHost for GithubClient {
    async fn get_issue_details(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<IssueDetails, HostError> {
        let path = format!("{}/issues/{number}", Self::repo_path(repo));
        let body: Value = self
            .send_json(self.request(Method::GET, &path), &format!("Fetch issue #{number}"))
            .await?;
        let issue = IssueContext::from_payload(&body)
            .map_err(|reason| HostError::new(HostErrorStatus::InvalidResponse, reason))?;
        Ok(IssueDetails {
            issue,
            author: body.pointer("/user/login").and_then(Value::as_str).map(str::to_string),
            state: text_field(&body, "state"),
            comments: body.get("comments").and_then(Value::as_u64).unwrap_or_default(),
            created_at: text_field(&body, "created_at"),
            updated_at: text_field(&body, "updated_at"),
        })
    }

    async fn get_default_branch(&self, repo: &RepositoryRef) -> Result<BranchName, HostError> {
        let response: RepositoryResponse = self
            .send_json(self.request(Method::GET, &Self::repo_path(repo)), "Fetch repository")
            .await?;
        response
            .default_branch
            .and_then(BranchName::new)
            .ok_or_else(|| {
                HostError::new(
                    HostErrorStatus::InvalidResponse,
                    format!("Repository {repo} reports no default branch"),
                )
            })
    }

    async fn get_latest_commit_sha(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<CommitSha, HostError> {
        let path = format!(
            "{}/git/ref/heads/{}",
            Self::repo_path(repo),
            Self::encode_segments(branch.as_str())
        );
        let response: RefResponse = self
            .send_json(self.request(Method::GET, &path), &format!("Resolve branch {branch}"))
            .await?;
        CommitSha::new(response.object.sha).ok_or_else(|| {
            HostError::new(
                HostErrorStatus::InvalidResponse,
                format!("Branch {branch} resolved to an empty SHA"),
            )
        })
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        new_branch: &BranchName,
        base_branch: &BranchName,
    ) -> Result<BranchCreation, HostError> {
        self.require_token("create a branch")?;
        let base_sha = self.get_latest_commit_sha(repo, base_branch).await?;

        let request = CreateRefRequest {
            ref_name: format!("refs/heads/{new_branch}"),
            sha: base_sha.as_str(),
        };
        let builder = self
            .request(Method::POST, &format!("{}/git/refs", Self::repo_path(repo)))
            .json(&request);
        let (status, body) = self.send(builder).await?;

        if status.is_success() {
            info!(branch = %new_branch, base = %base_branch, "Branch created");
            return Ok(BranchCreation::Created);
        }
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let error = error_body(&body);
            if error.mentions("Reference already exists") || error.has_code("already_exists") {
                info!(branch = %new_branch, "Branch already exists");
                return Ok(BranchCreation::AlreadyExists);
            }
        }
        Err(status_error(status, &body, &format!("Create branch {new_branch}")))
    }

    async fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<Option<CommitSha>, HostError> {
        Ok(self
            .fetch_entry(repo, path, branch)
            .await?
            .and_then(|entry| CommitSha::new(entry.sha)))
    }

    async fn get_file_content(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileContent, HostError> {
        let entry = self.fetch_entry(repo, path, branch).await?.ok_or_else(|| {
            HostError::http(HostErrorStatus::NotFound, 404, format!("File not found: {path}"))
        })?;
        let content = decode_content(path, &entry)?;
        let sha = CommitSha::new(entry.sha).ok_or_else(|| {
            HostError::new(
                HostErrorStatus::InvalidResponse,
                format!("Contents of {path} carry no SHA"),
            )
        })?;
        Ok(FileContent {
            file_path: path.clone(),
            content,
            sha,
        })
    }

    async fn create_or_update_file(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        path: &FilePath,
        content: &str,
        message: &str,
    ) -> Result<CommitInfo, HostError> {
        self.require_token("commit files")?;
        // Not atomic: the file may change between this lookup and the write.
        let existing = self.get_file_sha(repo, path, branch).await?;
        debug!(path = %path, update = existing.is_some(), "Writing file");

        let request = PutContentRequest {
            message,
            content: STANDARD.encode(content.as_bytes()),
            branch: branch.as_str(),
            sha: existing.as_ref().map(CommitSha::as_str),
        };
        let builder = self
            .request(Method::PUT, &Self::contents_path(repo, path))
            .json(&request);
        let response: ContentWriteResponse = self
            .send_json(builder, &format!("Write {path}"))
            .await?;
        Ok(commit_info(response, existing.is_none()))
    }

    async fn delete_file(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        path: &FilePath,
        message: &str,
    ) -> Result<CommitInfo, HostError> {
        self.require_token("delete files")?;
        let sha = self.get_file_sha(repo, path, branch).await?.ok_or_else(|| {
            HostError::new(
                HostErrorStatus::FileNotFound,
                format!("File not found on branch {branch}: {path}"),
            )
        })?;

        let request = DeleteContentRequest {
            message,
            sha: sha.as_str(),
            branch: branch.as_str(),
        };
        let builder = self
            .request(Method::DELETE, &Self::contents_path(repo, path))
            .json(&request);
        let response: ContentWriteResponse = self
            .send_json(builder, &format!("Delete {path}"))
            .await?;
        Ok(commit_info(response, false))
    }

    async fn list_files_recursive(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Vec<FilePath>, HostError> {
        let head = self.get_latest_commit_sha(repo, branch).await?;
        let path = format!("{}/git/trees/{head}", Self::repo_path(repo));
        let builder = self.request(Method::GET, &path).query(&[("recursive", "1")]);
        let tree: TreeResponse = self.send_json(builder, "List repository tree").await?;
        if tree.truncated {
            warn!(repository = %repo, branch = %branch, "Tree listing was truncated by GitHub");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter_map(|entry| FilePath::new(entry.path))
            .collect())
    }

    async fn add_issue_comment(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentInfo, HostError> {
        self.require_token("post a comment")?;
        let path = format!("{}/issues/{number}/comments", Self::repo_path(repo));
        let builder = self.request(Method::POST, &path).json(&CommentRequest { body });
        let response: CommentResponse = self
            .send_json(builder, &format!("Comment on issue #{number}"))
            .await?;
        info!(issue = %number, comment = response.id, "Comment posted");
        Ok(CommentInfo {
            id: CommentId::new(response.id),
            url: response.html_url,
        })
    }

    fn is_authenticated(&self) -> bool {
        self.has_token()
    }
}
