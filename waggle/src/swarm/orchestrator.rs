//! Multi-stage workflow orchestration.
//!
//! A workflow is a DAG of nodes, each backed by its own swarm. Nodes execute
//! sequentially in topological order; by default a node's input is the
//! previous node's output (the original prompt for the first node), and
//! optional shell commands can transform the input and output of every node.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

use crate::definition::{CommandSpec, NodeSpec, SwarmSpec, WorkflowSpec};
use crate::error::{Error, Result};
use crate::events::LogStream;
use crate::model::ModelCatalog;
use crate::provider::{EnvProviderFactory, ProviderFactory, RetryPolicy};
use crate::swarm::Swarm;

/// Condensed per-node outcome kept in the results map.
#[derive(Debug, Clone, Default)]
pub struct NodeResult {
    /// Final content produced by the node's swarm.
    pub content: Option<String>,
    /// Failure display, if the node failed.
    pub error: Option<String>,
    /// Whether the node's execution timed out.
    pub timeout: bool,
    /// Node wall-clock duration.
    pub duration: Duration,
}

impl NodeResult {
    /// Whether the node finished gracefully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Payload piped to node input/output commands.
#[derive(Debug, Clone, Serialize)]
pub struct NodeContext {
    /// Workflow name.
    pub workflow: String,
    /// Node name.
    pub node: String,
    /// The input the node is about to receive (or received).
    pub input: String,
    /// The node's output, set for output commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Executes a workflow, caching one swarm per node.
pub struct NodeOrchestrator {
    workflow: WorkflowSpec,
    catalog: ModelCatalog,
    providers: Arc<dyn ProviderFactory>,
    log: LogStream,
    retry: RetryPolicy,
    swarms: tokio::sync::Mutex<HashMap<String, Arc<Swarm>>>,
    results: Mutex<HashMap<String, NodeResult>>,
}

impl std::fmt::Debug for NodeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeOrchestrator")
            .field("workflow", &self.workflow.name)
            .finish_non_exhaustive()
    }
}

impl NodeOrchestrator {
    /// Orchestrator with default services.
    #[must_use]
    pub fn new(workflow: WorkflowSpec) -> Self {
        Self {
            workflow,
            catalog: ModelCatalog::builtin(),
            providers: Arc::new(EnvProviderFactory),
            log: LogStream::new(),
            retry: RetryPolicy::default(),
            swarms: tokio::sync::Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the model catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the provider factory.
    #[must_use]
    pub fn provider_factory(mut self, providers: Arc<dyn ProviderFactory>) -> Self {
        self.providers = providers;
        self
    }

    /// Share an event stream across all node swarms.
    #[must_use]
    pub fn log(mut self, log: LogStream) -> Self {
        self.log = log;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The event stream shared by the node swarms.
    #[must_use]
    pub fn log_stream(&self) -> &LogStream {
        &self.log
    }

    /// Results recorded so far, keyed by node name.
    #[must_use]
    pub fn results(&self) -> HashMap<String, NodeResult> {
        self.results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }

    /// Run the workflow; returns the final node's result.
    ///
    /// Nodes execute sequentially in topological order. An input command
    /// exiting 2 halts the workflow; the halt is recorded as the failing
    /// node's result.
    #[instrument(skip(self, prompt), fields(workflow = %self.workflow.name))]
    pub async fn execute(&self, prompt: &str) -> Result<NodeResult> {
        let order: Vec<NodeSpec> = self
            .workflow
            .execution_order()?
            .into_iter()
            .cloned()
            .collect();

        let mut previous_output: Option<String> = None;
        let mut last = NodeResult::default();
        for node in &order {
            let mut input = previous_output
                .clone()
                .unwrap_or_else(|| prompt.to_string());

            if let Some(command) = &node.input_command {
                let ctx = NodeContext {
                    workflow: self.workflow.name.clone(),
                    node: node.name.clone(),
                    input: input.clone(),
                    output: None,
                };
                match run_node_command(command, &ctx).await {
                    CommandOutcome::Replace(stdout) => input = stdout,
                    CommandOutcome::PassThrough => {}
                    CommandOutcome::Halt(stderr) => {
                        let halted = NodeResult {
                            content: None,
                            error: Some(format!("halted by input_command: {stderr}")),
                            timeout: false,
                            duration: Duration::ZERO,
                        };
                        self.record(&node.name, halted.clone());
                        return Ok(halted);
                    }
                }
            }

            let swarm = self.swarm_for(node).await?;
            let execution = swarm.execute(&input).await;
            let mut result = NodeResult {
                content: execution.content.clone(),
                error: execution.error.as_ref().map(ToString::to_string),
                timeout: execution.metadata.timeout,
                duration: execution.duration,
            };

            if let Some(command) = &node.output_command {
                let ctx = NodeContext {
                    workflow: self.workflow.name.clone(),
                    node: node.name.clone(),
                    input,
                    output: result.content.clone(),
                };
                match run_node_command(command, &ctx).await {
                    CommandOutcome::Replace(stdout) => result.content = Some(stdout),
                    CommandOutcome::PassThrough => {}
                    CommandOutcome::Halt(stderr) => {
                        result.error = Some(format!("halted by output_command: {stderr}"));
                        self.record(&node.name, result.clone());
                        return Ok(result);
                    }
                }
            }

            previous_output = result.content.clone();
            self.record(&node.name, result.clone());
            last = result;
        }
        Ok(last)
    }

    /// Fetch or build the swarm for a node by name.
    pub(crate) async fn node_swarm(&self, name: &str) -> Result<Arc<Swarm>> {
        let node = self
            .workflow
            .nodes
            .iter()
            .find(|node| node.name == name)
            .ok_or_else(|| {
                Error::Configuration(crate::error::ConfigError::invalid(format!(
                    "unknown workflow node '{name}'"
                )))
            })?
            .clone();
        self.swarm_for(&node).await
    }

    /// Node swarms built so far, in arbitrary order.
    pub(crate) async fn cached_swarms(&self) -> Vec<(String, Arc<Swarm>)> {
        self.swarms
            .lock()
            .await
            .iter()
            .map(|(name, swarm)| (name.clone(), Arc::clone(swarm)))
            .collect()
    }

    fn record(&self, node: &str, result: NodeResult) {
        if let Ok(mut results) = self.results.lock() {
            results.insert(node.to_string(), result);
        }
    }

    /// Fetch or build the cached swarm for a node.
    async fn swarm_for(&self, node: &NodeSpec) -> Result<Arc<Swarm>> {
        {
            let swarms = self.swarms.lock().await;
            if let Some(swarm) = swarms.get(&node.name) {
                return Ok(Arc::clone(swarm));
            }
        }
        let mut spec = SwarmSpec::new(format!("{}:{}", self.workflow.name, node.name));
        spec.agents = node.agents.clone();
        spec.lead_agent = node.lead.clone();
        spec.execution_timeout = self.workflow.execution_timeout;

        let swarm = Swarm::builder(spec)
            .catalog(self.catalog.clone())
            .provider_factory(Arc::clone(&self.providers))
            .log(self.log.clone())
            .retry(self.retry)
            .build()?;
        let swarm = Arc::new(swarm);
        self.swarms
            .lock()
            .await
            .insert(node.name.clone(), Arc::clone(&swarm));
        Ok(swarm)
    }
}

enum CommandOutcome {
    Replace(String),
    PassThrough,
    Halt(String),
}

/// Run a node command with the context JSON on stdin.
///
/// Exit 0 replaces with stdout, 1 passes through unchanged, 2 halts with
/// stderr; any other exit (or a timeout) is logged and passes through.
async fn run_node_command(command: &CommandSpec, ctx: &NodeContext) -> CommandOutcome {
    let payload = match serde_json::to_vec(ctx) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(command = %command.command, error = %err, "node command payload failed");
            return CommandOutcome::PassThrough;
        }
    };
    let mut child = match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command.command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(command = %command.command, error = %err, "node command failed to spawn");
            return CommandOutcome::PassThrough;
        }
    };
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(&payload).await;
        drop(stdin);
    }
    let output = match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!(command = %command.command, error = %err, "node command failed");
            return CommandOutcome::PassThrough;
        }
        Err(_) => {
            warn!(command = %command.command, "node command timed out");
            return CommandOutcome::PassThrough;
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(0) => CommandOutcome::Replace(stdout),
        Some(1) => CommandOutcome::PassThrough,
        Some(2) => CommandOutcome::Halt(stderr),
        code => {
            warn!(command = %command.command, ?code, stderr, "node command reported an error");
            CommandOutcome::PassThrough
        }
    }
}
