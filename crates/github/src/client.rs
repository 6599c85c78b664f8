//! HTTP plumbing shared by every [`RepositoryHost`](pipeline::RepositoryHost) method.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use pipeline::{FilePath, HostError, HostErrorStatus, RepositoryRef};

use crate::models::ApiErrorBody;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version pinned in every request.
pub const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("octopilot/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure to construct a [`GithubClient`].
#[derive(Debug, Error)]
pub enum GithubClientError {
    /// The underlying HTTP client could not be built (TLS backend init).
    #[error("Failed to build the GitHub HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// GitHub REST client.
///
/// Stateless apart from the optional bearer token; cheap to clone and safe to
/// share across capabilities.
#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GithubClient {
    /// Creates a client for `base_url`. A blank token is treated as absent.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, GithubClientError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Creates a client reading the token from `GITHUB_TOKEN`.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, GithubClientError> {
        Self::new(base_url, std::env::var("GITHUB_TOKEN").ok())
    }

    pub(crate) fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Fails with `unauthenticated` unless a token is configured.
    pub(crate) fn require_token(&self, operation: &str) -> Result<(), HostError> {
        if self.has_token() {
            Ok(())
        } else {
            warn!(operation, "GitHub write attempted without a token");
            Err(HostError::unauthenticated(operation))
        }
    }

    pub(crate) fn repo_path(repo: &RepositoryRef) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        )
    }

    /// Percent-encodes each segment of a slash-separated path.
    pub(crate) fn encode_segments(path: &str) -> String {
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub(crate) fn contents_path(repo: &RepositoryRef, path: &FilePath) -> String {
        format!(
            "{}/contents/{}",
            Self::repo_path(repo),
            Self::encode_segments(path.as_str().trim_start_matches('/'))
        )
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "GitHub request");
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and returns the status with the decoded body.
    ///
    /// Transport failures become a synthesised 503. An empty body decodes to
    /// [`Value::Null`] and a non-JSON body to a [`Value::String`].
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, Value), HostError> {
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "GitHub request failed before a response");
            HostError::network(format!("Network error contacting GitHub: {e}"))
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HostError::network(format!("Failed to read GitHub response: {e}")))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }

    /// Sends a request that must succeed and decodes its body as `T`.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<T, HostError> {
        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(status_error(status, &body, context));
        }
        decode(body, context)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: Value, context: &str) -> Result<T, HostError> {
    serde_json::from_value(body).map_err(|e| {
        HostError::new(
            HostErrorStatus::InvalidResponse,
            format!("{context}: unexpected response shape: {e}"),
        )
    })
}

pub(crate) fn error_body(body: &Value) -> ApiErrorBody {
    serde_json::from_value(body.clone()).unwrap_or_default()
}

/// Maps a non-success response to a tagged error.
pub(crate) fn status_error(status: StatusCode, body: &Value, context: &str) -> HostError {
    let detail = error_body(body)
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    let tag = match status {
        StatusCode::NOT_FOUND => HostErrorStatus::NotFound,
        _ => HostErrorStatus::HttpError,
    };
    warn!(status = status.as_u16(), context, detail = %detail, "GitHub request rejected");
    HostError::http(
        tag,
        status.as_u16(),
        format!("{context}: HTTP {}: {detail}", status.as_u16()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_token_counts_as_absent() {
        let client = GithubClient::new(DEFAULT_API_URL, Some("  ".into())).unwrap();
        assert!(!client.has_token());
        assert_eq!(
            client.require_token("post a comment").unwrap_err().status,
            HostErrorStatus::Unauthenticated
        );
    }

    #[test]
    fn content_paths_encode_each_segment() {
        let repo = RepositoryRef::new("octo", "my repo").unwrap();
        let path = FilePath::new("docs/a b.md").unwrap();
        assert_eq!(
            GithubClient::contents_path(&repo, &path),
            "/repos/octo/my%20repo/contents/docs/a%20b.md"
        );
    }

    #[test]
    fn not_found_is_tagged_separately() {
        let err = status_error(StatusCode::NOT_FOUND, &json!({"message": "Not Found"}), "Fetch issue");
        assert_eq!(err.status, HostErrorStatus::NotFound);
        assert_eq!(err.http_status, Some(404));
        let err = status_error(StatusCode::BAD_GATEWAY, &Value::Null, "Fetch issue");
        assert_eq!(err.status, HostErrorStatus::HttpError);
        assert!(err.message.contains("502"));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let client = GithubClient::new(DEFAULT_API_URL, Some("ghp_secret".into())).unwrap();
        assert!(!format!("{client:?}").contains("ghp_secret"));
    }
}
