#![cfg_attr(docsrs, feature(doc_cfg))]
//! Waggle is a multi-agent LLM orchestration runtime.
//!
//! A *swarm* is a set of LLM-backed agents that hold independent
//! conversations, invoke tools (file I/O, shell, HTTP, shared scratchpad,
//! per-agent semantic memory, MCP servers) and delegate sub-tasks to one
//! another. The runtime drives the full request/response loop against the
//! provider, executes tool calls under concurrency and permission policies,
//! enforces retries and timeouts, tracks token/cost/context consumption, and
//! publishes a structured event stream for observers.
//!
//! # Example
//!
//! ```rust,ignore
//! use waggle::prelude::*;
//!
//! let spec = SwarmSpec::new("support")
//!     .agent(
//!         AgentDefinition::new("triage", "gpt-4o")
//!             .system_prompt("Route incoming issues to the right specialist.")
//!             .delegates_to(DelegateSpec::new("backend")),
//!     )
//!     .agent(AgentDefinition::new("backend", "gpt-4o"));
//!
//! let swarm = Swarm::builder(spec).build()?;
//! let result = swarm.execute("the login endpoint returns 500s").await;
//! println!("{}", result.content.unwrap_or_default());
//! ```

// Core data types
pub mod error;
pub mod events;
pub mod message;
pub mod model;

// Configuration surface
pub mod definition;

// Tools and policies
pub mod scratchpad;
pub mod skill;
pub mod tool;
pub mod tools;
pub mod tracker;

// Hooks and providers
pub mod hooks;
pub mod provider;

// Agents, swarms, plugins
pub mod agent;
pub mod plugin;
pub mod snapshot;
pub mod swarm;

// Integrations
#[cfg(feature = "mcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "mcp")))]
pub mod mcp;

pub mod prelude;

// Re-export the types most callers touch.
pub use agent::{AskResult, Chat};
pub use definition::{AgentDefinition, DelegateSpec, SwarmSpec, ToolSpec, WorkflowSpec};
pub use error::{ConfigError, Error, LlmError, Result, StateError};
pub use events::{LogRecord, LogStream, SwarmEvent};
pub use message::{Content, Message, Role, ToolCall};
pub use swarm::{ExecutionResult, NodeOrchestrator, Swarm};
