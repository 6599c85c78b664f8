//! Repository coordinates and the issue context every stage consumes.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::IssueNumber;

/// An `owner/name` pair identifying a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// User or organisation owning the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepositoryRef {
    /// Creates a reference, returning `None` if either part is blank or
    /// contains a `/`.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let owner = owner.into().trim().to_string();
        let name = name.into().trim().to_string();
        let valid = |s: &str| !s.is_empty() && !s.contains('/');
        (valid(&owner) && valid(&name)).then_some(Self { owner, name })
    }

    /// Resolves a repository from a `name` or `owner/name` argument plus an
    /// optional explicit owner. The explicit owner wins over an embedded one.
    pub fn resolve(repo: &str, owner_override: Option<&str>) -> Option<Self> {
        let (embedded_owner, name) = match repo.trim().split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, repo),
        };
        let owner = owner_override
            .filter(|o| !o.trim().is_empty())
            .or(embedded_owner)?;
        Self::new(owner, name)
    }

    /// The browser URL of an issue in this repository.
    pub fn issue_url(&self, number: IssueNumber) -> String {
        format!("https://github.com/{}/{}/issues/{}", self.owner, self.name, number)
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn issue_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/\s]+)/([^/\s]+)/issues/(\d+)")
            .unwrap_or_else(|e| unreachable!("static issue URL pattern is valid: {e}"))
    })
}

/// Splits `https://github.com/<owner>/<repo>/issues/<n>` into its parts.
pub fn parse_issue_url(url: &str) -> Option<(RepositoryRef, IssueNumber)> {
    let caps = issue_url_pattern().captures(url.trim())?;
    let repo = RepositoryRef::new(&caps[1], &caps[2])?;
    let number = caps[3].parse::<u64>().ok()?;
    Some((repo, IssueNumber::new(number)))
}

// ---------------------------------------------------------------------------

/// The issue being resolved. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContext {
    /// Issue number.
    pub number: IssueNumber,
    /// Issue title.
    pub title: String,
    /// Issue body (markdown). A placeholder when the issue has no body.
    pub body: String,
    /// Label names.
    pub labels: BTreeSet<String>,
    /// Browser URL of the issue.
    pub url: String,
}

const UNKNOWN_TITLE: &str = "Unknown Title";
const EMPTY_BODY: &str = "No body provided.";

impl IssueContext {
    /// Builds an issue context from a capability payload or a raw GitHub
    /// issue document.
    ///
    /// Labels may be plain strings or `{ "name": ... }` objects. The URL is
    /// taken from `url` when it is a browser URL, otherwise from `html_url`.
    /// Fails when the payload is an error payload or lacks a numeric `number`.
    pub fn from_payload(payload: &Value) -> Result<Self, String> {
        if let Some(error) = payload.get("error") {
            return Err(match error.as_str() {
                Some(message) => message.to_string(),
                None => error.to_string(),
            });
        }
        let number = payload
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| "payload has no numeric issue number".to_string())?;

        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        };

        let labels = payload
            .get("labels")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|label| match label {
                        Value::String(name) => Some(name.as_str()),
                        Value::Object(_) => label.get("name").and_then(Value::as_str),
                        _ => None,
                    })
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let url = text("html_url")
            .or_else(|| text("url").filter(|u| u.starts_with("https://github.com/")))
            .or_else(|| text("url"))
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            number: IssueNumber::new(number),
            title: text("title").unwrap_or(UNKNOWN_TITLE).to_string(),
            body: text("body").unwrap_or(EMPTY_BODY).to_string(),
            labels,
            url,
        })
    }

    /// Labels joined for prompt text.
    pub fn labels_display(&self) -> String {
        if self.labels.is_empty() {
            "(none)".to_string()
        } else {
            self.labels.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_issue_urls() {
        let (repo, number) = parse_issue_url("https://github.com/owner/repo/issues/12").unwrap();
        assert_eq!(repo.to_string(), "owner/repo");
        assert_eq!(number.as_u64(), 12);
        assert!(parse_issue_url("https://gitlab.com/owner/repo/issues/12").is_none());
        assert!(parse_issue_url("https://github.com/owner/repo/pull/12").is_none());
    }

    #[test]
    fn resolve_prefers_explicit_owner() {
        let repo = RepositoryRef::resolve("someone/tool", Some("org")).unwrap();
        assert_eq!(repo.to_string(), "org/tool");
        let repo = RepositoryRef::resolve("someone/tool", None).unwrap();
        assert_eq!(repo.to_string(), "someone/tool");
        assert!(RepositoryRef::resolve("tool", None).is_none());
        assert!(RepositoryRef::resolve("", Some("org")).is_none());
    }

    #[test]
    fn issue_context_accepts_both_label_shapes() {
        let payload = json!({
            "number": 7,
            "title": "Crash on start",
            "body": "Stack trace...",
            "labels": [{"name": "bug"}, "chore", {"color": "fff"}],
            "html_url": "https://github.com/o/r/issues/7"
        });
        let issue = IssueContext::from_payload(&payload).unwrap();
        assert_eq!(issue.number.as_u64(), 7);
        assert_eq!(issue.labels.len(), 2);
        assert!(issue.labels.contains("bug"));
        assert!(issue.labels.contains("chore"));
        assert_eq!(issue.url, "https://github.com/o/r/issues/7");
    }

    #[test]
    fn issue_context_defaults_missing_text() {
        let issue = IssueContext::from_payload(&json!({"number": 3, "body": null})).unwrap();
        assert_eq!(issue.title, "Unknown Title");
        assert_eq!(issue.body, "No body provided.");
        assert_eq!(issue.labels_display(), "(none)");
    }

    #[test]
    fn issue_context_rejects_error_and_non_numeric_payloads() {
        let err = IssueContext::from_payload(&json!({"error": "HTTP 404", "status": "not_found"}));
        assert_eq!(err.unwrap_err(), "HTTP 404");
        assert!(IssueContext::from_payload(&json!({"number": "12"})).is_err());
    }

    #[test]
    fn issue_context_round_trips_through_its_own_serialisation() {
        let issue = IssueContext::from_payload(&json!({
            "number": 12, "title": "Fix typo", "body": "...", "labels": [],
            "url": "https://github.com/owner/repo/issues/12"
        }))
        .unwrap();
        let again = IssueContext::from_payload(&serde_json::to_value(&issue).unwrap()).unwrap();
        assert_eq!(issue, again);
    }
}
