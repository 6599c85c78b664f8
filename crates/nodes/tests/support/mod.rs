//! Test doubles shared by the `nodes` integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use pipeline::{
    AgentError, AgentErrorKind, AgentRuntime, BranchCreation, BranchName, CommentId, CommentInfo,
    CommitInfo, CommitSha, FileContent, FilePath, HostError, HostErrorStatus, Invocation,
    InvocationTrace, IssueContext, IssueDetails, IssueNumber, RepositoryHost, RepositoryRef,
    RoleAgent, TokenUsage, TraceStep,
};

// ---------------------------------------------------------------------------
// In-memory repository host
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HostState {
    pub default_branch: Option<String>,
    pub issues: BTreeMap<u64, IssueDetails>,
    /// branch -> path -> content
    pub branches: BTreeMap<String, BTreeMap<String, String>>,
    pub directories: BTreeSet<String>,
    pub comments: Vec<String>,
    pub commit_messages: Vec<String>,
    /// One entry per write: `put <branch>:<path>` or `delete <branch>:<path>`.
    pub writes: Vec<String>,
    next_commit: u64,
}

pub struct InMemoryHost {
    pub repo: RepositoryRef,
    pub authenticated: bool,
    pub state: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new(owner: &str, name: &str) -> Self {
        let mut state = HostState::default();
        state.default_branch = Some("main".into());
        state.branches.insert("main".into(), BTreeMap::new());
        Self {
            repo: RepositoryRef::new(owner, name).unwrap(),
            authenticated: true,
            state: Mutex::new(state),
        }
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn with_issue(self, number: u64, title: &str, body: &str, labels: &[&str]) -> Self {
        let issue = IssueContext {
            number: IssueNumber::new(number),
            title: title.into(),
            body: body.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            url: self.repo.issue_url(IssueNumber::new(number)),
        };
        self.state.lock().unwrap().issues.insert(
            number,
            IssueDetails {
                issue,
                author: Some("octocat".into()),
                state: Some("open".into()),
                comments: 0,
                created_at: Some("2026-01-01T00:00:00Z".into()),
                updated_at: Some("2026-01-02T00:00:00Z".into()),
            },
        );
        self
    }

    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(branch.into())
            .or_default()
            .insert(path.into(), content.into());
        self
    }

    pub fn with_branch(self, branch: &str) -> Self {
        self.state.lock().unwrap().branches.entry(branch.into()).or_default();
        self
    }

    pub fn without_default_branch(self) -> Self {
        self.state.lock().unwrap().default_branch = None;
        self
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.state.lock().unwrap().branches.get(branch)?.get(path).cloned()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.state.lock().unwrap().branches.contains_key(branch)
    }

    pub fn comments(&self) -> Vec<String> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().unwrap().commit_messages.clone()
    }

    fn check_repo(&self, repo: &RepositoryRef) -> Result<(), HostError> {
        if repo == &self.repo {
            Ok(())
        } else {
            Err(HostError::http(HostErrorStatus::NotFound, 404, "Not Found"))
        }
    }

    fn require_token(&self, operation: &str) -> Result<(), HostError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(HostError::unauthenticated(operation))
        }
    }
}

fn not_found(what: &str) -> HostError {
    HostError::http(HostErrorStatus::NotFound, 404, format!("{what} not found"))
}

#[async_trait]
impl RepositoryHost for InMemoryHost {
    async fn get_issue_details(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<IssueDetails, HostError> {
        self.check_repo(repo)?;
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number.as_u64())
            .cloned()
            .ok_or_else(|| not_found("issue"))
    }

    async fn get_default_branch(&self, repo: &RepositoryRef) -> Result<BranchName, HostError> {
        self.check_repo(repo)?;
        let state = self.state.lock().unwrap();
        state
            .default_branch
            .as_deref()
            .and_then(BranchName::new)
            .ok_or_else(|| HostError::network("connection refused"))
    }

    async fn get_latest_commit_sha(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<CommitSha, HostError> {
        self.check_repo(repo)?;
        if self.has_branch(branch.as_str()) {
            Ok(CommitSha::new(format!("head-{branch}")).unwrap())
        } else {
            Err(not_found("branch"))
        }
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        new_branch: &BranchName,
        base_branch: &BranchName,
    ) -> Result<BranchCreation, HostError> {
        self.require_token("create a branch")?;
        self.check_repo(repo)?;
        let mut state = self.state.lock().unwrap();
        let base = state
            .branches
            .get(base_branch.as_str())
            .cloned()
            .ok_or_else(|| not_found("base branch"))?;
        if state.branches.contains_key(new_branch.as_str()) {
            return Ok(BranchCreation::AlreadyExists);
        }
        state.branches.insert(new_branch.as_str().to_string(), base);
        Ok(BranchCreation::Created)
    }

    async fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<Option<CommitSha>, HostError> {
        self.check_repo(repo)?;
        Ok(self
            .file(branch.as_str(), path.as_str())
            .map(|_| CommitSha::new(format!("blob-{path}")).unwrap()))
    }

    async fn get_file_content(
        &self,
        repo: &RepositoryRef,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileContent, HostError> {
        self.check_repo(repo)?;
        if self.state.lock().unwrap().directories.contains(path.as_str()) {
            return Err(HostError::new(
                HostErrorStatus::IsDirectory,
                format!("Path '{path}' is a directory"),
            ));
        }
        let content = self
            .file(branch.as_str(), path.as_str())
            .ok_or_else(|| not_found("file"))?;
        Ok(FileContent {
            file_path: path.clone(),
            content,
            sha: CommitSha::new(format!("blob-{path}")).unwrap(),
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
        self.check_repo(repo)?;
        let mut state = self.state.lock().unwrap();
        let files = state
            .branches
            .get_mut(branch.as_str())
            .ok_or_else(|| not_found("branch"))?;
        let created = files.insert(path.as_str().to_string(), content.to_string()).is_none();
        state.writes.push(format!("put {branch}:{path}"));
        state.commit_messages.push(message.to_string());
        state.next_commit += 1;
        Ok(CommitInfo {
            commit_sha: CommitSha::new(format!("c{}", state.next_commit)),
            commit_url: None,
            created,
        })
    }

    async fn delete_file(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        path: &FilePath,
        message: &str,
    ) -> Result<CommitInfo, HostError> {
        self.require_token("delete a file")?;
        self.check_repo(repo)?;
        let mut state = self.state.lock().unwrap();
        let removed = state
            .branches
            .get_mut(branch.as_str())
            .and_then(|files| files.remove(path.as_str()));
        if removed.is_none() {
            return Err(HostError::new(
                HostErrorStatus::FileNotFound,
                format!("File '{path}' not found on branch '{branch}'"),
            ));
        }
        state.writes.push(format!("delete {branch}:{path}"));
        state.commit_messages.push(message.to_string());
        state.next_commit += 1;
        Ok(CommitInfo {
            commit_sha: CommitSha::new(format!("c{}", state.next_commit)),
            commit_url: None,
            created: false,
        })
    }

    async fn list_files_recursive(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Vec<FilePath>, HostError> {
        self.check_repo(repo)?;
        let state = self.state.lock().unwrap();
        let files = state.branches.get(branch.as_str()).ok_or_else(|| not_found("branch"))?;
        Ok(files.keys().filter_map(FilePath::new).collect())
    }

    async fn add_issue_comment(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentInfo, HostError> {
        self.require_token("post a comment")?;
        self.check_repo(repo)?;
        let mut state = self.state.lock().unwrap();
        state.comments.push(body.to_string());
        let id = state.comments.len() as u64;
        Ok(CommentInfo {
            id: CommentId::new(id),
            url: format!("{}#issuecomment-{id}", self.repo.issue_url(number)),
        })
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

// ---------------------------------------------------------------------------
// Scripted agent runtime
// ---------------------------------------------------------------------------

/// What a scripted role does for one invocation: the capability calls it
/// makes (in order), then its final text.
pub struct Reply {
    pub calls: Vec<(String, Value)>,
    pub text: String,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            text: text.into(),
        }
    }

    pub fn call(mut self, capability: &str, input: Value) -> Self {
        self.calls.push((capability.to_string(), input));
        self
    }
}

type Script = Box<dyn Fn(&str) -> Reply + Send + Sync>;

/// Runs role agents from per-role scripts keyed by agent name. Capability
/// calls are executed against the agent's real bound capabilities, so the
/// executor sees genuine payloads in the trace.
#[derive(Default)]
pub struct ScriptedRuntime {
    scripts: HashMap<String, Script>,
    log: Mutex<Vec<(String, String)>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, agent: &str, script: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        self.scripts.insert(agent.to_string(), Box::new(script));
        self
    }

    pub fn without(mut self, agent: &str) -> Self {
        self.scripts.remove(agent);
        self
    }

    /// `(agent, input)` for every invocation, in order.
    pub fn invocations(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, agent: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(name, _)| name == agent).count()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn invoke(&self, agent: &RoleAgent, input: &str) -> Result<Invocation, AgentError> {
        self.log
            .lock()
            .unwrap()
            .push((agent.name.clone(), input.to_string()));
        let script = self.scripts.get(&agent.name).ok_or_else(|| {
            AgentError::new(AgentErrorKind::Api, format!("no script for {}", agent.name))
        })?;
        let reply = script(input);

        let mut trace = InvocationTrace::new();
        for (name, call_input) in reply.calls {
            let capability = agent
                .capability(&name)
                .unwrap_or_else(|| panic!("{} is not bound to {name}", agent.name));
            let output = capability.call(call_input.clone()).await;
            trace.push(TraceStep {
                capability: name,
                input: call_input,
                output,
            });
        }
        Ok(Invocation {
            final_output: reply.text,
            trace,
            usage: TokenUsage::single(100, 20),
        })
    }
}

/// The comment body embedded in a comment-poster prompt.
pub fn comment_body(prompt: &str) -> String {
    prompt
        .split_once("--- BEGIN COMMENT ---\n")
        .and_then(|(_, rest)| rest.rsplit_once("\n--- END COMMENT ---"))
        .map(|(body, _)| body.to_string())
        .unwrap_or_default()
}
