//! GitHub REST payloads.
//!
//! Only the fields the adapter reads are modelled. Anything optional on the
//! wire is `Option` or `#[serde(default)]` so a sparse response never fails
//! to decode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryResponse {
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefResponse {
    pub object: GitObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: &'a str,
}

/// `GET /repos/{o}/{r}/contents/{path}` for a single entry.
#[derive(Debug, Deserialize)]
pub(crate) struct ContentEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentRequest<'a> {
    pub message: &'a str,
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteContentRequest<'a> {
    pub message: &'a str,
    pub sha: &'a str,
    pub branch: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CommitRef {
    pub sha: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentWriteResponse {
    #[serde(default)]
    pub commit: CommitRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeResponse {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentRequest<'a> {
    pub body: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentResponse {
    pub id: u64,
    #[serde(default)]
    pub html_url: String,
}

/// Error body GitHub returns with 4xx responses.
///
/// `errors` entries are usually objects with a `code`, but some endpoints
/// return bare strings.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn mentions(&self, needle: &str) -> bool {
        let folded = needle.to_lowercase();
        self.message
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(&folded))
            || self.errors.iter().any(|e| match e {
                serde_json::Value::String(s) => s.to_lowercase().contains(&folded),
                other => other
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .is_some_and(|m| m.to_lowercase().contains(&folded)),
            })
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors
            .iter()
            .any(|e| e.get("code").and_then(serde_json::Value::as_str) == Some(code))
    }
}
