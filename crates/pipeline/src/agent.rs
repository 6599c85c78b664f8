//! Role agents, capabilities, and invocation traces.
//!
//! A [`RoleAgent`] is plain configuration: a name, instructions, the
//! capabilities the model may call, and a model id. The runtime that drives it
//! lives behind [`crate::AgentRuntime`]. Every invocation returns the model's
//! final text plus an [`InvocationTrace`] of the capability calls it made; the
//! executor mines structured payloads out of that trace with
//! [`InvocationTrace::last_result`] and [`InvocationTrace::extract`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ModelId, TokenUsage};

/// A named async operation a model may invoke mid-reasoning.
///
/// Implementations never fail at the type level: errors are reported as a
/// JSON payload carrying an `"error"` key (see [`crate::HostError::to_payload`]).
#[async_trait]
pub trait Capability: Send + Sync {
    /// Tool name exposed to the model.
    fn name(&self) -> &str;

    /// One-paragraph description exposed to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> Value;

    /// Executes the capability.
    async fn call(&self, input: Value) -> Value;
}

// ---------------------------------------------------------------------------

/// Configuration for one pipeline role.
#[derive(Clone)]
pub struct RoleAgent {
    /// Role name, used in logs and as the agent identity.
    pub name: String,
    /// System instructions.
    pub instructions: String,
    /// Capabilities the model may call.
    pub capabilities: Vec<Arc<dyn Capability>>,
    /// Model to run.
    pub model: ModelId,
}

impl RoleAgent {
    /// A role without capabilities.
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, model: ModelId) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            capabilities: Vec::new(),
            model,
        }
    }

    /// Binds a capability.
    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Finds a bound capability by name.
    pub fn capability(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Debug for RoleAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.capabilities.iter().map(|c| c.name()).collect();
        f.debug_struct("RoleAgent")
            .field("name", &self.name)
            .field("capabilities", &names)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------

/// One capability call made during an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Name of the capability that was called.
    pub capability: String,
    /// Arguments the model supplied.
    pub input: Value,
    /// Raw result returned to the model.
    pub output: Value,
}

/// Ordered capability calls of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationTrace(Vec<TraceStep>);

impl InvocationTrace {
    /// An empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn push(&mut self, step: TraceStep) {
        self.0.push(step);
    }

    /// All steps in call order.
    pub fn steps(&self) -> &[TraceStep] {
        &self.0
    }

    /// The last structured payload produced by `capability`.
    pub fn last_result(&self, capability: &str) -> Option<&Value> {
        self.0
            .iter()
            .rev()
            .find(|s| s.capability == capability)
            .map(|s| &s.output)
    }

    /// The last payload of `capability`, decoded as `T`.
    pub fn extract<T: DeserializeOwned>(&self, capability: &str) -> Option<T> {
        self.last_result(capability)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// `true` if `capability` was called at least once.
    pub fn called(&self, capability: &str) -> bool {
        self.0.iter().any(|s| s.capability == capability)
    }
}

impl FromIterator<TraceStep> for InvocationTrace {
    fn from_iter<I: IntoIterator<Item = TraceStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of running a role agent once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// The model's final text.
    pub final_output: String,
    /// Capability calls made along the way.
    pub trace: InvocationTrace,
    /// Tokens consumed by every model request of this invocation.
    pub usage: TokenUsage,
}
