//! Convenience re-exports for building and running swarms.

pub use crate::agent::{AskResult, Chat};
pub use crate::definition::{
    AgentDefinition, CommandSpec, DefaultTools, DelegateSpec, NodeSpec, SwarmSpec, ToolSpec,
    WorkflowSpec,
};
pub use crate::error::{ConfigError, Error, LlmError, Result, StateError};
pub use crate::events::{LogRecord, LogStream, SubscriberId, SwarmEvent};
pub use crate::hooks::{HookContext, HookDefinition, HookEvent, HookOutcome};
pub use crate::message::{Content, Message, Role, ToolCall};
pub use crate::model::{ModelCatalog, ModelInfo, ModelPricing};
pub use crate::plugin::memory::{Embedder, MemoryMode, MemoryPlugin};
pub use crate::plugin::{Plugin, PluginSet};
pub use crate::provider::{
    ChatRequest, ChatResponse, FixedProviderFactory, HttpProvider, HttpProviderConfig,
    MockProvider, Provider, ProviderFactory, RetryPolicy, SamplingParams,
};
pub use crate::skill::SkillState;
pub use crate::snapshot::{Snapshot, SnapshotKind};
pub use crate::swarm::{
    ExecutionMetadata, ExecutionResult, NodeOrchestrator, NodeResult, Swarm,
};
pub use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, ToolPermissions,
    ToolRegistry,
};
