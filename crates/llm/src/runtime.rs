//! The tool-use loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use pipeline::{
    AgentError, AgentErrorKind, AgentRuntime, Invocation, InvocationTrace, RetryPolicy, RoleAgent,
    TokenUsage, TraceStep,
};

use crate::api::{
    ApiErrorEnvelope, ApiMessage, ApiTool, ContentBlock, MessagesRequest, MessagesResponse,
    ANTHROPIC_VERSION,
};

/// Public Anthropic endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_MAX_TURNS: usize = 16;
const DEFAULT_MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Failure to construct an [`AnthropicRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeBuildError {
    /// The API key is empty.
    #[error("ANTHROPIC_API_KEY is empty")]
    MissingApiKey,
    /// The underlying HTTP client could not be built.
    #[error("Failed to build the Anthropic HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Runs role agents against the Anthropic Messages API.
///
/// Each invocation is a loop: send the conversation, execute every `tool_use`
/// block against the agent's bound capabilities (sequentially, in block
/// order), append the results, and repeat until the model answers without
/// requesting a tool or the turn budget runs out.
pub struct AnthropicRuntime {
    client: Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    max_turns: usize,
    max_retries: u32,
}

impl std::fmt::Debug for AnthropicRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicRuntime")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("max_turns", &self.max_turns)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl AnthropicRuntime {
    /// Creates a runtime for `base_url`.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, RuntimeBuildError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RuntimeBuildError::MissingApiKey);
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Caps model requests per invocation.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Caps re-sends of a rate-limited or failed-to-connect request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets `max_tokens` on every request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn send_once(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, AgentError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::new(AgentErrorKind::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let mut error = error_from_response(status, &body);
            error.retry_after = retry_after;
            return Err(error);
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::new(AgentErrorKind::InvalidResponse, e.to_string()))
    }

    /// Sends with bounded back-off on retryable failures.
    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, AgentError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    let RetryPolicy::Retryable { after } = error.retry_policy() else {
                        return Err(error);
                    };
                    if attempt >= self.max_retries {
                        return Err(error);
                    }
                    let delay = after.unwrap_or(BASE_BACKOFF.saturating_mul(2u32.saturating_pow(attempt)));
                    warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "Retrying model request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_loop(&self, agent: &RoleAgent, input: &str) -> Result<Invocation, AgentError> {
        let tools: Vec<ApiTool> = agent
            .capabilities
            .iter()
            .map(|c| ApiTool {
                name: c.name().to_string(),
                description: c.description().to_string(),
                input_schema: c.input_schema(),
            })
            .collect();

        let mut messages = vec![ApiMessage::user(vec![ContentBlock::Text {
            text: input.to_string(),
        }])];
        let mut trace = InvocationTrace::new();
        let mut usage = TokenUsage::default();

        for turn in 0..self.max_turns {
            let request = MessagesRequest {
                model: agent.model.as_str(),
                max_tokens: self.max_tokens,
                system: &agent.instructions,
                messages: &messages,
                tools: &tools,
            };
            let response = self.send(&request).await?;
            usage += TokenUsage::single(response.usage.input_tokens, response.usage.output_tokens);

            let content: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|block| *block != ContentBlock::Unknown)
                .collect();
            let tool_uses: Vec<(String, String, Value)> = content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            debug!(
                turn,
                stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                tool_calls = tool_uses.len(),
                "Model turn complete"
            );

            if tool_uses.is_empty() {
                let final_output = content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                return Ok(Invocation {
                    final_output,
                    trace,
                    usage,
                });
            }

            messages.push(ApiMessage::assistant(content));
            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, tool_input) in tool_uses {
                let output = match agent.capability(&name) {
                    Some(capability) => capability.call(tool_input.clone()).await,
                    None => {
                        warn!(capability = %name, "Model requested an unbound capability");
                        json!({"error": format!("Unknown tool: {name}"), "status": "invalid_input"})
                    }
                };
                let is_error = output.get("error").is_some();
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.to_string(),
                    is_error,
                });
                trace.push(TraceStep {
                    capability: name,
                    input: tool_input,
                    output,
                });
            }
            messages.push(ApiMessage::user(results));
        }

        Err(AgentError::new(
            AgentErrorKind::TurnLimitExceeded,
            format!("'{}' did not finish within {} model turns", agent.name, self.max_turns),
        ))
    }
}

fn error_from_response(status: StatusCode, body: &str) -> AgentError {
    let (error_type, message) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.error_type, envelope.error.message),
        Err(_) => (String::new(), format!("HTTP {}: {body}", status.as_u16())),
    };
    let kind = match (status.as_u16(), error_type.as_str()) {
        (401 | 403, _) | (_, "authentication_error" | "permission_error") => AgentErrorKind::Authentication,
        (429 | 529, _) | (_, "rate_limit_error" | "overloaded_error") => AgentErrorKind::RateLimited,
        _ => AgentErrorKind::Api,
    };
    AgentError::new(kind, message)
}

#[async_trait]
impl AgentRuntime for AnthropicRuntime {
    async fn invoke(&self, agent: &RoleAgent, input: &str) -> Result<Invocation, AgentError> {
        let span = info_span!("agent_invocation", agent = %agent.name, model = %agent.model);
        self.run_loop(agent, input).instrument(span).await
    }
}
