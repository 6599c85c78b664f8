//! Octopilot LLM runtime infrastructure adapter.
//!
//! Implements [`pipeline::AgentRuntime`] over Anthropic's Messages API. A
//! role agent's bound capabilities are advertised as tools; every `tool_use`
//! block the model emits is executed against the matching
//! [`pipeline::Capability`] and recorded in the invocation trace the executor
//! later mines for structured payloads.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing, and rate-limit back-off live here. The [`pipeline`] crate sees
//! only [`pipeline::AgentRuntime`].

mod api;
mod runtime;

pub use runtime::{AnthropicRuntime, RuntimeBuildError, DEFAULT_BASE_URL};
