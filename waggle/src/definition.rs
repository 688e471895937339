//! Declarative agent, swarm, and workflow definitions.
//!
//! The runtime consumes these values already parsed; the YAML surface that
//! produces them lives outside the core. Validation happens once, when a
//! [`crate::swarm::Swarm`] or workflow is built: configuration problems abort
//! before any agent is constructed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigError;
use crate::hooks::HookDefinition;
use crate::model::ModelCatalog;
use crate::provider::SamplingParams;
use crate::tool::ToolPermissions;

/// A tool granted to an agent, with optional permission policy.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Tool name from the catalog (or a plugin/delegation tool name).
    pub name: String,
    /// Permission policy wrapped around the tool.
    pub permissions: Option<ToolPermissions>,
}

impl ToolSpec {
    /// A tool grant without a permission policy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: None,
        }
    }

    /// A tool grant with a permission policy.
    #[must_use]
    pub fn with_permissions(name: impl Into<String>, permissions: ToolPermissions) -> Self {
        Self {
            name: name.into(),
            permissions: Some(permissions),
        }
    }
}

/// One `delegates_to` edge.
#[derive(Debug, Clone)]
pub struct DelegateSpec {
    /// Target agent name.
    pub agent: String,
    /// Explicit tool name; derived (`WorkWith<Target>`) when absent.
    pub tool_name: Option<String>,
    /// Share the target's singleton conversation instead of creating a
    /// per-caller instance.
    pub preserve_context: bool,
}

impl DelegateSpec {
    /// Delegate to `agent` with a shared conversation.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            tool_name: None,
            preserve_context: true,
        }
    }

    /// Override the synthesized tool name.
    #[must_use]
    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Use a fresh per-caller conversation for this edge.
    #[must_use]
    pub const fn fresh_context(mut self) -> Self {
        self.preserve_context = false;
        self
    }
}

/// Which built-in tools an agent starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefaultTools {
    /// Register the full built-in catalog.
    #[default]
    Enabled,
    /// Register only explicitly listed tools.
    Disabled,
    /// Register the catalog minus the named tools.
    Without(Vec<String>),
}

/// Declarative description of one agent.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Unique name within the swarm.
    pub name: String,
    /// Human-readable description, used when other agents delegate here.
    pub description: String,
    /// Working directory for file and shell tools.
    pub directory: PathBuf,
    /// System prompt installed as the first message.
    pub system_prompt: Option<String>,
    /// Model id, resolved against the catalog.
    pub model: String,
    /// Provider name, e.g. `openai`.
    pub provider: String,
    /// Override for the provider endpoint.
    pub base_url: Option<String>,
    /// Provider API version selecting an alternate request shape.
    pub api_version: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout: Option<Duration>,
    /// Context window override; catalog value used when absent.
    pub context_window: Option<u64>,
    /// Sampling parameters forwarded to the provider.
    pub parameters: SamplingParams,
    /// Extra HTTP headers for provider requests.
    pub headers: HashMap<String, String>,
    /// Tools granted to the agent.
    pub tools: Vec<ToolSpec>,
    /// Delegation edges.
    pub delegates_to: Vec<DelegateSpec>,
    /// Opaque per-plugin configuration, keyed by plugin name.
    pub plugin_configs: HashMap<String, Value>,
    /// Hooks attached to this agent.
    pub hooks: Vec<HookDefinition>,
    /// Disable permission wrapping entirely.
    pub bypass_permissions: bool,
    /// Built-in tool filter.
    pub disable_default_tools: DefaultTools,
    /// Skip the catalog check for unknown model ids.
    pub assume_model_exists: bool,
    /// Bound on concurrent tool calls within one assistant turn.
    pub max_concurrent_tools: Option<usize>,
}

impl AgentDefinition {
    /// Create a definition with the given name and model, defaults elsewhere.
    #[must_use]
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            directory: PathBuf::from("."),
            system_prompt: None,
            model: model.into(),
            provider: "openai".to_string(),
            base_url: None,
            api_version: None,
            request_timeout: None,
            context_window: None,
            parameters: SamplingParams::default(),
            headers: HashMap::new(),
            tools: Vec::new(),
            delegates_to: Vec::new(),
            plugin_configs: HashMap::new(),
            hooks: Vec::new(),
            bypass_permissions: false,
            disable_default_tools: DefaultTools::default(),
            assume_model_exists: false,
            max_concurrent_tools: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Grant a tool.
    #[must_use]
    pub fn tool(mut self, spec: ToolSpec) -> Self {
        self.tools.push(spec);
        self
    }

    /// Add a delegation edge.
    #[must_use]
    pub fn delegates_to(mut self, spec: DelegateSpec) -> Self {
        self.delegates_to.push(spec);
        self
    }

    /// Attach a hook.
    #[must_use]
    pub fn hook(mut self, hook: HookDefinition) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set per-plugin configuration.
    #[must_use]
    pub fn plugin_config(mut self, plugin: impl Into<String>, config: Value) -> Self {
        self.plugin_configs.insert(plugin.into(), config);
        self
    }
}

/// Declarative description of a swarm.
#[derive(Debug, Clone)]
pub struct SwarmSpec {
    /// Swarm name, used in events.
    pub name: String,
    /// Agent definitions, in insertion order.
    pub agents: Vec<AgentDefinition>,
    /// Lead agent; defaults to the first definition.
    pub lead_agent: Option<String>,
    /// Wall-clock bound on one `execute` call.
    pub execution_timeout: Option<Duration>,
    /// Process-wide bound on concurrent tool executions.
    pub global_concurrency: usize,
    /// Default per-agent bound on concurrent tool calls in one turn.
    pub default_local_concurrency: usize,
}

impl SwarmSpec {
    /// Default process-wide tool concurrency.
    pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 8;
    /// Default per-agent tool concurrency.
    pub const DEFAULT_LOCAL_CONCURRENCY: usize = 4;

    /// Create a spec with the given name and no agents.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agents: Vec::new(),
            lead_agent: None,
            execution_timeout: None,
            global_concurrency: Self::DEFAULT_GLOBAL_CONCURRENCY,
            default_local_concurrency: Self::DEFAULT_LOCAL_CONCURRENCY,
        }
    }

    /// Add an agent definition.
    #[must_use]
    pub fn agent(mut self, definition: AgentDefinition) -> Self {
        self.agents.push(definition);
        self
    }

    /// Set the lead agent.
    #[must_use]
    pub fn lead(mut self, name: impl Into<String>) -> Self {
        self.lead_agent = Some(name.into());
        self
    }

    /// Set the execution timeout.
    #[must_use]
    pub const fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Resolved lead agent name.
    #[must_use]
    pub fn lead_name(&self) -> Option<&str> {
        self.lead_agent
            .as_deref()
            .or_else(|| self.agents.first().map(|agent| agent.name.as_str()))
    }

    /// Look up an agent definition by name.
    #[must_use]
    pub fn agent_named(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    /// Validate the spec against a model catalog.
    ///
    /// Checks name uniqueness, delegate resolution, model existence (unless
    /// assumed), and delegation-graph acyclicity.
    pub fn validate(&self, catalog: &ModelCatalog) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::invalid("swarm has no agents"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::DuplicateAgent {
                    agent: agent.name.clone(),
                });
            }
        }

        if let Some(lead) = &self.lead_agent {
            if !seen.contains(lead.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "lead agent '{lead}' is not defined in the swarm"
                )));
            }
        }

        for agent in &self.agents {
            for delegate in &agent.delegates_to {
                if !seen.contains(delegate.agent.as_str()) {
                    return Err(ConfigError::UnknownDelegate {
                        referrer: agent.name.clone(),
                        agent: delegate.agent.clone(),
                    });
                }
            }
            if !agent.assume_model_exists && !catalog.contains(&agent.model) {
                return Err(ConfigError::UnknownModel {
                    agent: agent.name.clone(),
                    model: agent.model.clone(),
                });
            }
        }

        detect_delegation_cycle(self)
    }
}

/// Depth-first search over `delegates_to`, rejecting any directed cycle.
fn detect_delegation_cycle(spec: &SwarmSpec) -> Result<(), ConfigError> {
    let edges: HashMap<&str, Vec<&str>> = spec
        .agents
        .iter()
        .map(|agent| {
            (
                agent.name.as_str(),
                agent
                    .delegates_to
                    .iter()
                    .map(|delegate| delegate.agent.as_str())
                    .collect(),
            )
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), ConfigError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|name| *name == node).unwrap_or(0);
                let mut path: Vec<&str> = stack[start..].to_vec();
                path.push(node);
                return Err(ConfigError::CircularDependency {
                    cycle: path.join(" → "),
                });
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(next) = edges.get(node) {
            for target in next {
                visit(target, edges, marks, stack)?;
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for agent in &spec.agents {
        visit(agent.name.as_str(), &edges, &mut marks, &mut stack)?;
    }
    Ok(())
}

/// Shell command run around a workflow node.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command line, run through the platform shell.
    pub command: String,
    /// Timeout for the command.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Default command timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a command spec with the default timeout.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One node of a multi-stage workflow.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Unique node name.
    pub name: String,
    /// Agents forming this node's swarm.
    pub agents: Vec<AgentDefinition>,
    /// Lead agent; defaults to the first.
    pub lead: Option<String>,
    /// Nodes that must complete before this one.
    pub dependencies: Vec<String>,
    /// Transforms the node input before execution.
    pub input_command: Option<CommandSpec>,
    /// Transforms the node output after execution.
    pub output_command: Option<CommandSpec>,
}

impl NodeSpec {
    /// Create a node with the given name and no agents.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agents: Vec::new(),
            lead: None,
            dependencies: Vec::new(),
            input_command: None,
            output_command: None,
        }
    }

    /// Add an agent definition.
    #[must_use]
    pub fn agent(mut self, definition: AgentDefinition) -> Self {
        self.agents.push(definition);
        self
    }

    /// Add a dependency edge.
    #[must_use]
    pub fn depends_on(mut self, node: impl Into<String>) -> Self {
        self.dependencies.push(node.into());
        self
    }

    /// Set the input command.
    #[must_use]
    pub fn input_command(mut self, command: CommandSpec) -> Self {
        self.input_command = Some(command);
        self
    }

    /// Set the output command.
    #[must_use]
    pub fn output_command(mut self, command: CommandSpec) -> Self {
        self.output_command = Some(command);
        self
    }
}

/// A multi-stage workflow: a DAG of named nodes.
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    /// Workflow name.
    pub name: String,
    /// Node definitions.
    pub nodes: Vec<NodeSpec>,
    /// Wall-clock bound applied to each node's swarm.
    pub execution_timeout: Option<Duration>,
}

impl WorkflowSpec {
    /// Create a workflow with the given name and no nodes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            execution_timeout: None,
        }
    }

    /// Add a node.
    #[must_use]
    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate node names, dependency resolution, and acyclicity, then
    /// return the nodes in a valid execution order.
    pub fn execution_order(&self) -> Result<Vec<&NodeSpec>, ConfigError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate workflow node '{}'",
                    node.name
                )));
            }
        }
        for node in &self.nodes {
            for dependency in &node.dependencies {
                if !names.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownNodeDependency {
                        node: node.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm, preserving declaration order among ready nodes.
        let mut pending: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|node| (node.name.as_str(), node.dependencies.len()))
            .collect();
        let mut order: Vec<&NodeSpec> = Vec::with_capacity(self.nodes.len());
        while order.len() < self.nodes.len() {
            let next = self.nodes.iter().find(|node| {
                pending.get(node.name.as_str()) == Some(&0)
                    && !order.iter().any(|done| done.name == node.name)
            });
            let Some(node) = next else {
                let stuck: Vec<&str> = pending
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(name, _)| *name)
                    .collect();
                return Err(ConfigError::CircularDependency {
                    cycle: stuck.join(" → "),
                });
            };
            order.push(node);
            for other in &self.nodes {
                if other.dependencies.iter().any(|dep| dep == &node.name) {
                    if let Some(count) = pending.get_mut(other.name.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        Ok(order)
    }
}
