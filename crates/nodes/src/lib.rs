//! Octopilot capabilities, role agents, and the pipeline executor.
//!
//! This crate binds the [`pipeline::RepositoryHost`] operations to
//! agent-callable capabilities, defines the role agents that use them, and
//! provides the [`PipelineExecutor`] that sequences the roles from triage to
//! the posted report.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The executor sequences calls between business
//! logic in the [`pipeline`] crate and the two infrastructure traits
//! ([`pipeline::RepositoryHost`] and [`pipeline::AgentRuntime`]). Domain
//! rules (operation parsing, approval, branch naming, commit reconciliation)
//! stay in [`pipeline`]; this crate only decides what runs when.
//!
//! ## Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`tools`] | The seven capabilities and the [`Toolbox`] that binds them to a host |
//! | [`agents`] | Role instructions and the [`RoleSet`] |
//! | [`prompts`] | Per-role input text |
//! | [`executor`] | [`PipelineExecutor`], [`RunOutcome`] |

pub mod agents;
pub mod executor;
pub mod prompts;
pub mod tools;

pub use agents::RoleSet;
pub use executor::{parse_identified_files, resolve_repository, PipelineExecutor, RunOutcome};
pub use tools::Toolbox;
