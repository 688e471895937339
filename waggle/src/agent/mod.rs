//! Per-agent chat engine.
//!
//! A [`Chat`] drives one conversation with one provider: it appends the user
//! prompt, loops provider calls while the model requests tools, executes
//! those calls under the concurrency and permission policies, and returns the
//! final content-only assistant message. Retries, orphan-call repair, context
//! compression, and hook injection all live here.

pub mod context;
pub mod delegation;
pub mod repair;
pub mod usage;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, Weak};

use serde_json::json;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::definition::{AgentDefinition, DefaultTools};
use crate::error::{ConfigError, LlmError, Result};
use crate::events::SwarmEvent;
use crate::hooks::{HookContext, HookEvent, HookExecutor, HookOutcome};
use crate::message::{Message, ToolCall};
use crate::model::is_reasoning_model;
use crate::provider::{ChatRequest, Provider, chat_with_retry};
use crate::skill::SkillState;
use crate::swarm::{SwarmCore, SwarmServices};
use crate::tool::{
    PermissionValidator, SkillSlot, Tool, ToolContext, ToolOutput, ToolRegistry, ToolSource,
};
use crate::tools;

use context::ContextTracker;
use delegation::{DelegationArgs, DelegationEdge, DelegationTool, delegation_tool_name};
use usage::UsageSummary;

/// Outcome of one `ask`, including a possible swarm-finish marker.
#[derive(Debug, Clone)]
pub struct AskResult {
    /// The final assistant message.
    pub message: Message,
    /// Set when a hook finished the whole execution from inside this ask.
    pub finish_swarm: Option<String>,
}

/// How a finish marker left a tool turn.
#[derive(Debug, Clone)]
enum FinishSignal {
    Agent(String),
    Swarm(String),
}

/// Result of a single tool call within a turn.
struct CallOutcome {
    tool_call_id: String,
    tool_name: String,
    content: String,
    signal: Option<FinishSignal>,
}

/// One agent's conversation and its runtime wiring.
pub struct Chat {
    definition: AgentDefinition,
    instance_name: String,
    base_name: String,
    provider: Arc<dyn Provider>,
    messages: Vec<Message>,
    registry: ToolRegistry,
    skill: SkillSlot,
    context: ContextTracker,
    hooks: HookExecutor,
    delegations: HashMap<String, DelegationEdge>,
    active_delegations: Mutex<HashMap<String, String>>,
    services: SwarmServices,
    swarm: Weak<SwarmCore>,
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("agent", &self.instance_name)
            .field("model", &self.definition.model)
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl Chat {
    /// Construct a chat for `definition`.
    ///
    /// `instance_name` is the agent name, or `"<base>@<delegator>"` for a
    /// per-caller delegation instance.
    pub(crate) fn build(
        definition: &AgentDefinition,
        instance_name: &str,
        services: SwarmServices,
        swarm: Weak<SwarmCore>,
    ) -> Result<Self> {
        let base_name = instance_name
            .split('@')
            .next()
            .unwrap_or(instance_name)
            .to_string();

        let provider = services.providers.create(definition)?;

        // Assemble the registry: filtered defaults, plugin tools, delegation
        // tools, then the explicit grants with their permission policies.
        let mut registry = ToolRegistry::new();
        let catalog = tools::default_tools();
        let enabled = |name: &str| match &definition.disable_default_tools {
            DefaultTools::Enabled => true,
            DefaultTools::Disabled => false,
            DefaultTools::Without(disabled) => !disabled.iter().any(|d| d == name),
        };
        for tool in &catalog {
            if enabled(tool.name()) {
                registry.register(Arc::clone(tool), ToolSource::Builtin);
            }
        }
        for tool in services.plugins.tools_for(definition) {
            registry.register(tool, ToolSource::Plugin);
        }

        let mut delegations = HashMap::new();
        for edge in &definition.delegates_to {
            let name = edge
                .tool_name
                .clone()
                .unwrap_or_else(|| delegation_tool_name(&edge.agent));
            let target_description = swarm
                .upgrade()
                .and_then(|core| {
                    core.spec
                        .agent_named(&edge.agent)
                        .map(|agent| agent.description.clone())
                })
                .unwrap_or_default();
            registry.register(
                Arc::new(DelegationTool::new(&name, &edge.agent, &target_description)),
                ToolSource::Plugin,
            );
            delegations.insert(
                name,
                DelegationEdge {
                    target: edge.agent.clone(),
                    preserve_context: edge.preserve_context,
                },
            );
        }

        for spec in &definition.tools {
            if !registry.contains(&spec.name) {
                // An explicit grant re-enables a tool dropped from defaults.
                match catalog.iter().find(|tool| tool.name() == spec.name) {
                    Some(tool) => registry.register(Arc::clone(tool), ToolSource::Builtin),
                    None => {
                        return Err(ConfigError::invalid(format!(
                            "agent '{}' grants unknown tool '{}'",
                            definition.name, spec.name
                        ))
                        .into());
                    }
                }
            }
            if definition.bypass_permissions {
                continue;
            }
            if let Some(policy) = &spec.permissions {
                let entry = registry
                    .get(&spec.name)
                    .expect("tool registered above")
                    .clone();
                let wrapped = PermissionValidator::wrap(Arc::clone(&entry.base_instance), policy)?;
                registry.register_wrapped(wrapped, entry.base_instance, entry.source);
            }
        }

        // Context window: explicit override, then catalog, then the default.
        let context_limit = definition
            .context_window
            .unwrap_or_else(|| services.catalog.context_window(&definition.model));
        if !services.catalog.contains(&definition.model) {
            services.log.emit(
                Some(instance_name),
                SwarmEvent::ModelLookupWarning {
                    model: definition.model.clone(),
                },
            );
        }

        let mut messages = Vec::new();
        let mut system_prompt = definition.system_prompt.clone().unwrap_or_default();
        if let Some(contribution) = services.plugins.system_prompt_for(definition) {
            if !system_prompt.is_empty() {
                system_prompt.push_str("\n\n");
            }
            system_prompt.push_str(&contribution);
        }
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }

        let hooks = HookExecutor::new(definition.hooks.clone());

        Ok(Self {
            definition: definition.clone(),
            instance_name: instance_name.to_string(),
            base_name,
            provider,
            messages,
            registry,
            skill: SkillSlot::default(),
            context: ContextTracker::new(context_limit),
            hooks,
            delegations,
            active_delegations: Mutex::new(HashMap::new()),
            services,
            swarm,
        })
    }

    // ------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------

    /// The message log, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Instance name (`"<base>"` or `"<base>@<delegator>"`).
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Base agent name.
    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// The agent definition this chat was built from.
    #[must_use]
    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Prompt tokens of the most recent assistant turn.
    #[must_use]
    pub fn cumulative_input_tokens(&self) -> u64 {
        usage::cumulative_input_tokens(&self.messages)
    }

    /// Sum of completion tokens across assistant turns.
    #[must_use]
    pub fn cumulative_output_tokens(&self) -> u64 {
        usage::cumulative_output_tokens(&self.messages)
    }

    /// Full usage and cost summary.
    #[must_use]
    pub fn usage(&self) -> UsageSummary {
        usage::summarize(
            &self.messages,
            self.services.catalog.pricing(&self.definition.model),
        )
    }

    /// Current context usage in percent.
    #[must_use]
    pub fn context_usage_percentage(&self) -> f64 {
        self.context.usage_percentage(&self.messages)
    }

    /// Tokens left in the context window.
    #[must_use]
    pub fn tokens_remaining(&self) -> u64 {
        self.context.tokens_remaining(&self.messages)
    }

    /// Register a hook dynamically.
    pub fn add_hook(&mut self, hook: crate::hooks::HookDefinition) {
        self.hooks.add(hook);
    }

    /// Install a skill state, restricting the active tool set.
    pub fn load_skill_state(&self, state: SkillState) {
        if let Ok(mut slot) = self.skill.write() {
            *slot = Some(state);
        }
    }

    /// Clear the active skill, restoring the full tool set.
    pub fn clear_skill(&self) {
        if let Ok(mut slot) = self.skill.write() {
            *slot = None;
        }
    }

    /// The active skill state, if any.
    #[must_use]
    pub fn skill_state(&self) -> Option<SkillState> {
        self.skill.read().ok().and_then(|slot| slot.clone())
    }

    /// Names of the currently active tools, in registration order.
    pub fn active_tool_names(&self) -> Result<Vec<String>> {
        let skill = self.skill_state();
        let active = self.registry.active_tools(skill.as_ref())?;
        Ok(active.into_iter().map(|(name, _)| name).collect())
    }

    /// Append a user prompt, run the loop to a final assistant turn, and
    /// return it.
    #[instrument(skip(self, prompt), fields(agent = %self.instance_name))]
    pub async fn ask(&mut self, prompt: &str) -> Result<Message> {
        Ok(self.ask_with_signal(prompt).await?.message)
    }

    // ------------------------------------------------------------------
    // Snapshot/restore plumbing
    // ------------------------------------------------------------------

    pub(crate) fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub(crate) fn context_tracker(&self) -> &ContextTracker {
        &self.context
    }

    pub(crate) fn context_tracker_mut(&mut self) -> &mut ContextTracker {
        &mut self.context
    }

    // ------------------------------------------------------------------
    // The loop
    // ------------------------------------------------------------------

    pub(crate) async fn ask_with_signal(&mut self, prompt: &str) -> Result<AskResult> {
        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::UserPrompt {
                prompt: prompt.to_string(),
            },
        );

        // The swarm's very first user message gets its own hook event.
        if let Some(core) = self.swarm.upgrade() {
            if !core.first_message_sent.swap(true, Ordering::SeqCst) {
                let ctx = self.hook_ctx(HookEvent::FirstMessage).prompt(prompt);
                if let HookOutcome::Halt(canned) = self.hooks.run(&ctx).await {
                    return Ok(self.halt_with(prompt, canned));
                }
            }
        }

        // Plugin reminders (memory hits, skill suggestions) land as system
        // messages ahead of the user turn.
        let reminders = self
            .services
            .plugins
            .on_user_message(&self.base_name, prompt, &self.services.log)
            .await;
        for reminder in reminders {
            self.messages.push(Message::system(reminder));
        }

        let mut prompt_text = prompt.to_string();
        let ctx = self.hook_ctx(HookEvent::UserPrompt).prompt(prompt);
        match self.hooks.run(&ctx).await {
            HookOutcome::Halt(canned) => return Ok(self.halt_with(prompt, canned)),
            HookOutcome::Replace(addition) => {
                prompt_text = format!("{prompt_text}\n<hook-context>{addition}</hook-context>");
            }
            _ => {}
        }
        self.messages.push(Message::user(prompt_text));

        let mut repaired = false;
        loop {
            let request = self.build_request()?;
            let response = chat_with_retry(
                self.provider.as_ref(),
                &request,
                &self.services.retry,
                &self.services.log,
                &self.instance_name,
            )
            .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    if !repaired && err.mentions_tool_use() {
                        let pruned = repair::prune_orphan_tool_calls(&mut self.messages);
                        if !pruned.is_empty() {
                            self.services.log.emit(
                                Some(&self.instance_name),
                                SwarmEvent::OrphanToolCallsPruned {
                                    pruned_count: pruned.len(),
                                    calls: pruned
                                        .iter()
                                        .map(|call| call.rendered.clone())
                                        .collect(),
                                },
                            );
                            self.messages
                                .push(Message::user(repair::repair_reminder(&pruned)));
                            repaired = true;
                            continue;
                        }
                    }
                    let message = self.surface_llm_failure(err);
                    return Ok(AskResult {
                        message,
                        finish_swarm: None,
                    });
                }
            };

            let message = response.into_message();
            self.messages.push(message.clone());

            if !message.has_tool_calls() {
                self.services.log.emit(
                    Some(&self.instance_name),
                    SwarmEvent::AgentStop {
                        finish_reason: None,
                    },
                );
                let ctx = self.hook_ctx(HookEvent::AgentStop);
                let _ = self.hooks.run(&ctx).await;
                self.check_context().await;
                return Ok(AskResult {
                    message,
                    finish_swarm: None,
                });
            }

            self.services.log.emit(
                Some(&self.instance_name),
                SwarmEvent::AgentStep {
                    tools: message
                        .tool_calls
                        .iter()
                        .map(|call| call.name.clone())
                        .collect(),
                },
            );
            let ctx = self.hook_ctx(HookEvent::AgentStep);
            let _ = self.hooks.run(&ctx).await;

            if let Some(signal) = self.run_tool_turn(&message).await? {
                let (content, reason, finish_swarm) = match signal {
                    FinishSignal::Agent(content) => (content, "finish_agent", None),
                    FinishSignal::Swarm(content) => {
                        (content.clone(), "finish_swarm", Some(content))
                    }
                };
                let assistant = Message::assistant(content);
                self.messages.push(assistant.clone());
                self.services.log.emit(
                    Some(&self.instance_name),
                    SwarmEvent::AgentStop {
                        finish_reason: Some(reason.to_string()),
                    },
                );
                return Ok(AskResult {
                    message: assistant,
                    finish_swarm,
                });
            }

            self.check_context().await;
        }
    }

    /// Append the user prompt and a canned assistant reply without calling
    /// the provider (hook halt path).
    fn halt_with(&mut self, prompt: &str, canned: String) -> AskResult {
        self.messages.push(Message::user(prompt));
        let assistant = Message::assistant(canned);
        self.messages.push(assistant.clone());
        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::AgentStop {
                finish_reason: Some("halted_by_hook".to_string()),
            },
        );
        AskResult {
            message: assistant,
            finish_swarm: None,
        }
    }

    /// Convert a non-retryable provider failure into an assistant message.
    fn surface_llm_failure(&mut self, err: LlmError) -> Message {
        let err = match err {
            LlmError::UnexpectedShape { detail } if self.definition.base_url.is_some() => {
                LlmError::ProxyMisconfigured {
                    base_url: self.definition.base_url.clone().unwrap_or_default(),
                    detail,
                }
            }
            other => other,
        };
        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::LlmRequestFailed {
                status: err.status(),
                error: err.to_string(),
            },
        );
        let assistant = Message::assistant(format!(
            "LLM request failed: {err}. {}",
            err.remediation()
        ));
        self.messages.push(assistant.clone());
        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::AgentStop {
                finish_reason: Some("llm_request_failed".to_string()),
            },
        );
        assistant
    }

    fn build_request(&self) -> Result<ChatRequest> {
        let skill = self.skill_state();
        let active = self.registry.active_tools(skill.as_ref())?;
        let tools = active.iter().map(|(_, tool)| tool.definition()).collect();

        let mut parameters = self.definition.parameters.clone();
        if is_reasoning_model(&self.definition.model) {
            parameters.temperature = None;
            parameters.top_p = None;
        } else {
            parameters.reasoning_effort = None;
        }

        Ok(ChatRequest {
            model: self.definition.model.clone(),
            messages: self.messages.clone(),
            tools,
            parameters,
        })
    }

    fn hook_ctx(&self, event: HookEvent) -> HookContext {
        HookContext::new(event, &self.instance_name, &self.services.swarm_name)
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext::new(&self.instance_name, &self.definition.directory)
            .with_base_agent(&self.base_name)
            .with_scratchpad(self.services.scratchpad.clone())
            .with_trackers(self.services.files.clone(), self.services.memory.clone())
            .with_skill(Arc::clone(&self.skill))
    }

    /// Execute one assistant turn's tool calls and append their results.
    ///
    /// Calls run concurrently, bounded by the swarm-wide semaphore and the
    /// agent's own limit; results are appended in the order the assistant
    /// declared the calls, regardless of completion order.
    async fn run_tool_turn(&mut self, assistant: &Message) -> Result<Option<FinishSignal>> {
        let skill = self.skill_state();
        let active = self.registry.active_tools(skill.as_ref())?;
        let tool_ctx = self.tool_context();
        let local_limit = self
            .definition
            .max_concurrent_tools
            .unwrap_or(self.services.default_local_concurrency)
            .max(1);
        let local = Arc::new(Semaphore::new(local_limit));

        // Shared reborrow: the concurrent call futures only need `&Chat`.
        let this: &Chat = &*self;
        let active_ref = &active;
        let futures: Vec<_> = assistant
            .tool_calls
            .iter()
            .map(|call| {
                let local = Arc::clone(&local);
                let tool_ctx = tool_ctx.clone();
                async move {
                    let _local = local.acquire().await.ok();
                    let _global = this.services.semaphore.acquire().await.ok();
                    this.execute_call(call, active_ref, &tool_ctx).await
                }
            })
            .collect();
        let outcomes = futures::future::join_all(futures).await;

        let mut signal = None;
        for outcome in outcomes {
            self.messages
                .push(Message::tool(&outcome.tool_call_id, outcome.content));
            if outcome.tool_name == "TodoWrite" {
                self.context.last_todowrite_index = Some(self.messages.len() - 1);
            }
            if signal.is_none() {
                signal = outcome.signal;
            }
        }
        Ok(signal)
    }

    /// Execute a single tool call (or delegation) and wrap its result.
    async fn execute_call(
        &self,
        call: &ToolCall,
        active: &[(String, Arc<dyn Tool>)],
        tool_ctx: &ToolContext,
    ) -> CallOutcome {
        if let Some(edge) = self.delegations.get(&call.name) {
            return self.run_delegation(call, edge).await;
        }

        let hook_ctx = self
            .hook_ctx(HookEvent::PreToolUse)
            .tool_call(&call.name, call.arguments.clone());
        match self.hooks.run(&hook_ctx).await {
            HookOutcome::Halt(content) | HookOutcome::Replace(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content,
                    signal: None,
                };
            }
            HookOutcome::FinishAgent(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: content.clone(),
                    signal: Some(FinishSignal::Agent(content)),
                };
            }
            HookOutcome::FinishSwarm(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: content.clone(),
                    signal: Some(FinishSignal::Swarm(content)),
                };
            }
            _ => {}
        }

        let Some((_, tool)) = active.iter().find(|(name, _)| name == &call.name) else {
            return CallOutcome {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: ToolOutput::error(format!("tool '{}' is not available", call.name))
                    .into_content(),
                signal: None,
            };
        };

        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::ToolCall {
                tool: call.name.clone(),
                tool_call_id: call.id.clone(),
                arguments: call.arguments.clone(),
            },
        );
        let output = tool.call(tool_ctx, call.arguments.clone()).await;
        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::ToolResult {
                tool: call.name.clone(),
                tool_call_id: call.id.clone(),
                is_error: output.is_error(),
                bytes: output.content().len(),
            },
        );

        let mut content = output.into_content();
        let hook_ctx = self
            .hook_ctx(HookEvent::PostToolUse)
            .tool_call(&call.name, call.arguments.clone())
            .tool_result(content.clone());
        let signal = match self.hooks.run(&hook_ctx).await {
            HookOutcome::Replace(replacement) | HookOutcome::Halt(replacement) => {
                content = replacement;
                None
            }
            HookOutcome::FinishAgent(message) => Some(FinishSignal::Agent(message)),
            HookOutcome::FinishSwarm(message) => Some(FinishSignal::Swarm(message)),
            _ => None,
        };

        CallOutcome {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content,
            signal,
        }
    }

    /// Route a delegation call to the target agent's conversation.
    async fn run_delegation(&self, call: &ToolCall, edge: &DelegationEdge) -> CallOutcome {
        let args: DelegationArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(err) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: ToolOutput::error(format!(
                        "{}: invalid arguments: {err}",
                        call.name
                    ))
                    .into_content(),
                    signal: None,
                };
            }
        };
        let mut prompt = args.full_prompt();

        let hook_ctx = self
            .hook_ctx(HookEvent::PreDelegation)
            .subject(&edge.target)
            .extra(json!({"target": edge.target, "prompt": prompt}));
        match self.hooks.run(&hook_ctx).await {
            HookOutcome::Halt(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content,
                    signal: None,
                };
            }
            HookOutcome::Replace(replacement) => prompt = replacement,
            HookOutcome::FinishAgent(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: content.clone(),
                    signal: Some(FinishSignal::Agent(content)),
                };
            }
            HookOutcome::FinishSwarm(content) => {
                return CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: content.clone(),
                    signal: Some(FinishSignal::Swarm(content)),
                };
            }
            _ => {}
        }

        let Some(core) = self.swarm.upgrade() else {
            return CallOutcome {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: ToolOutput::error("delegation failed: swarm is shutting down")
                    .into_content(),
                signal: None,
            };
        };

        self.services.log.emit(
            Some(&self.instance_name),
            SwarmEvent::AgentDelegation {
                target: edge.target.clone(),
                tool_call_id: call.id.clone(),
            },
        );
        if let Ok(mut active) = self.active_delegations.lock() {
            active.insert(call.id.clone(), edge.target.clone());
        }

        let chat = if edge.preserve_context {
            core.chat(&edge.target).await
        } else {
            core.delegation_instance(&edge.target, &self.base_name).await
        };
        let result = match chat {
            Ok(chat) => SwarmCore::run_delegated(chat, prompt).await,
            Err(err) => Err(err),
        };

        if let Ok(mut active) = self.active_delegations.lock() {
            active.remove(&call.id);
        }

        match result {
            Ok(ask) => {
                let mut content = ask.message.text().unwrap_or_default().to_string();
                self.services.log.emit(
                    Some(&self.instance_name),
                    SwarmEvent::DelegationResult {
                        target: edge.target.clone(),
                        tool_call_id: call.id.clone(),
                        bytes: content.len(),
                    },
                );
                let hook_ctx = self
                    .hook_ctx(HookEvent::PostDelegation)
                    .subject(&edge.target)
                    .tool_result(content.clone());
                if let HookOutcome::Replace(replacement) | HookOutcome::Halt(replacement) =
                    self.hooks.run(&hook_ctx).await
                {
                    content = replacement;
                }
                CallOutcome {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content,
                    signal: ask.finish_swarm.map(FinishSignal::Swarm),
                }
            }
            Err(err) => CallOutcome {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: ToolOutput::error(format!("delegation to '{}' failed: {err}", edge.target))
                    .into_content(),
                signal: None,
            },
        }
    }

    /// Run a swarm-lifecycle hook event on this chat's executor.
    pub(crate) async fn run_lifecycle_hook(
        &self,
        event: HookEvent,
        extra: serde_json::Value,
    ) -> HookOutcome {
        let ctx = self.hook_ctx(event).extra(extra);
        self.hooks.run(&ctx).await
    }

    /// Compression and warning thresholds, checked after every turn.
    async fn check_context(&mut self) {
        let percentage = self.context.usage_percentage(&self.messages);
        if self.context.should_compress(percentage) {
            let (compressed_messages, saved_bytes) = self.context.compress(&mut self.messages);
            self.services.log.emit(
                Some(&self.instance_name),
                SwarmEvent::ContextCompression {
                    compressed_messages,
                    saved_bytes,
                },
            );
        }
        for threshold in self.context.crossed_thresholds(percentage) {
            self.services.log.emit(
                Some(&self.instance_name),
                SwarmEvent::ContextLimitWarning {
                    threshold,
                    usage_percentage: percentage,
                },
            );
            let ctx = self
                .hook_ctx(HookEvent::ContextWarning)
                .extra(json!({"threshold": threshold, "usage_percentage": percentage}));
            let _ = self.hooks.run(&ctx).await;
        }
    }
}
