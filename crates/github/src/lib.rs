//! Octopilot GitHub infrastructure adapter.
//!
//! Implements [`pipeline::RepositoryHost`] over the GitHub REST API with
//! `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (authentication headers, base64 contents payloads,
//! ref and tree endpoints, status-code mapping) are handled here; the
//! [`pipeline`] crate never sees them.
//!
//! ## Failure contract
//!
//! Every method returns a [`pipeline::HostError`] on failure. Transport errors
//! are reported as `network_error` with a synthesised HTTP 503, so callers
//! handle "GitHub was unreachable" and "GitHub said no" through the same path.
//! Write operations fail with `unauthenticated` before any request is sent
//! when no token is configured.

mod client;
mod host;
mod models;

pub use client::{GithubClient, GithubClientError, API_VERSION, DEFAULT_API_URL};
