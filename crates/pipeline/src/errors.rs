//! Error and retry-policy types for the Octopilot pipeline domain.
//!
//! [`PipelineError`] covers conditions that halt a run. [`HostError`] is the
//! structured, tagged error every [`crate::RepositoryHost`] method returns; it
//! never escapes as a panic or transport exception. [`AgentError`] describes a
//! failed agent invocation.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{IssueNumber, RepositoryRef};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the caller decide whether to
/// re-issue a request.
///
/// - `Retryable` errors: transient rate-limit or overload responses, network
///   failures.
/// - `NonRetryable` errors: authentication failures, invalid requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `retry-after` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a run.
///
/// Everything else (transport failures, unparsable agent output, exhausted
/// review cycles) degrades into data carried by the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No structured issue payload with a numeric issue number could be
    /// recovered from the triage invocation.
    #[error("Triage failed for issue #{issue}: {reason}")]
    TriageFailed {
        /// The issue the run was started for.
        issue: IssueNumber,
        /// Human-readable description of what was missing.
        reason: String,
    },

    /// The repository owner or name could not be determined.
    #[error("Could not resolve repository owner/name from '{input}'")]
    RepositoryUnresolved {
        /// The raw input that failed to resolve.
        input: String,
    },

    /// The remote's default branch could not be determined.
    #[error("Could not determine the default branch of {repository}")]
    DefaultBranchUnavailable {
        /// The repository that was queried.
        repository: RepositoryRef,
    },

    /// The run configuration is invalid.
    ///
    /// Produced before any stage executes; a run never starts with an invalid
    /// config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An agent invocation failed outright (not merely produced unusable text).
    #[error("Agent '{agent}' failed: {source}")]
    Agent {
        /// Name of the role agent that failed.
        agent: String,
        /// The underlying runtime failure.
        #[source]
        source: AgentError,
    },
}

// ---------------------------------------------------------------------------
// Version-control host errors
// ---------------------------------------------------------------------------

/// Machine-distinguishable failure tag of a [`HostError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostErrorStatus {
    /// The requested resource (issue, branch, file) does not exist.
    NotFound,
    /// A delete targeted a file that does not exist on the branch.
    FileNotFound,
    /// A content request resolved to a directory.
    IsDirectory,
    /// A content request resolved to something other than a file (symlink, submodule).
    NotAFile,
    /// A write operation was attempted without a credential.
    Unauthenticated,
    /// The remote answered with an unexpected HTTP status.
    HttpError,
    /// The request never produced an HTTP response.
    NetworkError,
    /// The response body could not be interpreted.
    InvalidResponse,
    /// A capability was invoked with arguments that could not be decoded.
    InvalidInput,
}

impl HostErrorStatus {
    /// The snake_case tag used in capability payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::FileNotFound => "file_not_found",
            Self::IsDirectory => "is_directory",
            Self::NotAFile => "not_a_file",
            Self::Unauthenticated => "unauthenticated",
            Self::HttpError => "http_error",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl std::fmt::Display for HostErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure returned by every [`crate::RepositoryHost`] operation.
///
/// Network-level failures carry a synthesised `503` so callers branch on one
/// contract regardless of whether the remote answered.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{status}: {message}")]
pub struct HostError {
    /// Failure tag.
    pub status: HostErrorStatus,
    /// Human-readable description.
    pub message: String,
    /// HTTP status code of the response, when one exists (503 for network failures).
    pub http_status: Option<u16>,
}

impl HostError {
    /// Creates an error without an HTTP status.
    pub fn new(status: HostErrorStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            http_status: None,
        }
    }

    /// Creates an error carrying the HTTP status of the response.
    pub fn http(status: HostErrorStatus, code: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            http_status: Some(code),
        }
    }

    /// Creates the synthesised 503 used for transport failures.
    pub fn network(message: impl Into<String>) -> Self {
        Self::http(HostErrorStatus::NetworkError, 503, message)
    }

    /// Creates the error returned by write operations without a credential.
    pub fn unauthenticated(operation: &str) -> Self {
        Self::new(
            HostErrorStatus::Unauthenticated,
            format!("GitHub token is required to {operation}."),
        )
    }

    /// Renders the error in the uniform capability result shape.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "error": self.message,
            "status": self.status.as_str(),
        });
        if let Some(code) = self.http_status {
            payload["http_status"] = json!(code);
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Agent runtime errors
// ---------------------------------------------------------------------------

/// Category of an [`AgentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// The model provider rejected the credential.
    Authentication,
    /// The provider is rate limiting or overloaded.
    RateLimited,
    /// The request never produced a response.
    Network,
    /// The provider answered with an error status.
    Api,
    /// The provider's response could not be decoded.
    InvalidResponse,
    /// The tool-use loop did not converge within its turn budget.
    TurnLimitExceeded,
}

/// A failed agent invocation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct AgentError {
    /// Failure category.
    pub kind: AgentErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Server-requested back-off, when the provider supplied one.
    pub retry_after: Option<Duration>,
}

impl AgentError {
    /// Creates an error with no back-off hint.
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether (and when) the failed request may be re-issued.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.kind {
            AgentErrorKind::RateLimited | AgentErrorKind::Network => RetryPolicy::Retryable {
                after: self.retry_after,
            },
            AgentErrorKind::Authentication
            | AgentErrorKind::Api
            | AgentErrorKind::InvalidResponse
            | AgentErrorKind::TurnLimitExceeded => RetryPolicy::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_synthesise_503() {
        let err = HostError::network("connection refused");
        assert_eq!(err.status, HostErrorStatus::NetworkError);
        assert_eq!(err.http_status, Some(503));
    }

    #[test]
    fn payload_carries_tag_and_message() {
        let payload = HostError::http(HostErrorStatus::NotFound, 404, "File not found: a.rs").to_payload();
        assert_eq!(payload["status"], "not_found");
        assert_eq!(payload["error"], "File not found: a.rs");
        assert_eq!(payload["http_status"], 404);
    }

    #[test]
    fn rate_limits_are_retryable_with_hint() {
        let mut err = AgentError::new(AgentErrorKind::RateLimited, "slow down");
        err.retry_after = Some(Duration::from_secs(2));
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            AgentError::new(AgentErrorKind::Authentication, "bad key").retry_policy(),
            RetryPolicy::NonRetryable
        );
    }
}
