//! Typed lifecycle hooks.
//!
//! Hooks observe and steer execution at fixed points in the agent and swarm
//! loops. For one event they run in descending priority order; the first
//! non-continue outcome short-circuits the rest. A hook is either an
//! in-process callback or a shell command fed the event payload as JSON on
//! stdin (see [`command`]).

mod command;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Events a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HookEvent {
    /// An `execute` call is starting.
    SwarmStart,
    /// The lead agent produced a final answer; may reprompt.
    SwarmStop,
    /// The first user message of a swarm's lifetime.
    FirstMessage,
    /// A user prompt is about to enter a conversation.
    UserPrompt,
    /// The model produced an assistant turn with tool calls.
    AgentStep,
    /// The model produced a final, content-only assistant turn.
    AgentStop,
    /// A tool call is about to execute.
    PreToolUse,
    /// A tool call finished.
    PostToolUse,
    /// A delegation is about to leave the calling agent.
    PreDelegation,
    /// A delegation returned to the calling agent.
    PostDelegation,
    /// Context usage crossed a warning threshold.
    ContextWarning,
    /// A debugger breakpoint was entered.
    BreakpointEnter,
    /// A debugger breakpoint was left.
    BreakpointExit,
}

impl HookEvent {
    /// Snake-case name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SwarmStart => "swarm_start",
            Self::SwarmStop => "swarm_stop",
            Self::FirstMessage => "first_message",
            Self::UserPrompt => "user_prompt",
            Self::AgentStep => "agent_step",
            Self::AgentStop => "agent_stop",
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::PreDelegation => "pre_delegation",
            Self::PostDelegation => "post_delegation",
            Self::ContextWarning => "context_warning",
            Self::BreakpointEnter => "breakpoint_enter",
            Self::BreakpointExit => "breakpoint_exit",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "swarm_start" => Ok(Self::SwarmStart),
            "swarm_stop" => Ok(Self::SwarmStop),
            "first_message" => Ok(Self::FirstMessage),
            "user_prompt" => Ok(Self::UserPrompt),
            "agent_step" => Ok(Self::AgentStep),
            "agent_stop" => Ok(Self::AgentStop),
            "pre_tool_use" => Ok(Self::PreToolUse),
            "post_tool_use" => Ok(Self::PostToolUse),
            "pre_delegation" => Ok(Self::PreDelegation),
            "post_delegation" => Ok(Self::PostDelegation),
            "context_warning" => Ok(Self::ContextWarning),
            "breakpoint_enter" => Ok(Self::BreakpointEnter),
            "breakpoint_exit" => Ok(Self::BreakpointExit),
            other => Err(ConfigError::invalid(format!("invalid hook event '{other}'"))),
        }
    }
}

/// What a hook tells the runtime to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HookOutcome {
    /// Proceed to the next hook, then to normal execution.
    Continue,
    /// Substitute the given value (tool result, prompt addition, …).
    Replace(String),
    /// Stop the guarded operation and surface the message instead.
    Halt(String),
    /// Finish the current agent's loop with the given assistant message.
    FinishAgent(String),
    /// Finish the whole execution with the given assistant message.
    FinishSwarm(String),
    /// Re-enter the lead loop with a new prompt (`swarm_stop` only).
    Reprompt(String),
}

impl HookOutcome {
    /// Whether execution proceeds unchanged.
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Event payload handed to hooks; serialized as JSON for command hooks.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    /// The event being dispatched.
    pub event: HookEvent,
    /// Agent in whose loop the event fired.
    pub agent: String,
    /// Swarm name.
    pub swarm: String,
    /// String the hook matcher is applied to: the tool name for tool events,
    /// the target agent for delegation events, the agent name otherwise.
    pub subject: String,
    /// Prompt text, for prompt-shaped events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Tool name, for tool events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool arguments, for tool events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
    /// Tool result content, for `post_tool_use`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
    /// Event-specific extras (thresholds, finish content, …).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl HookContext {
    /// A minimal context for an agent-scoped event.
    #[must_use]
    pub fn new(event: HookEvent, agent: impl Into<String>, swarm: impl Into<String>) -> Self {
        let agent = agent.into();
        Self {
            event,
            subject: agent.clone(),
            agent,
            swarm: swarm.into(),
            prompt: None,
            tool_name: None,
            tool_args: None,
            tool_result: None,
            extra: Value::Null,
        }
    }

    /// Set the matcher subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Attach a prompt.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Attach tool call details; also sets the matcher subject.
    #[must_use]
    pub fn tool_call(mut self, name: impl Into<String>, args: Value) -> Self {
        let name = name.into();
        self.subject = name.clone();
        self.tool_name = Some(name);
        self.tool_args = Some(args);
        self
    }

    /// Attach a tool result.
    #[must_use]
    pub fn tool_result(mut self, result: impl Into<String>) -> Self {
        self.tool_result = Some(result.into());
        self
    }

    /// Attach extra payload.
    #[must_use]
    pub fn extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }
}

/// Boxed asynchronous hook callback.
pub type HookHandler = Arc<dyn Fn(HookContext) -> BoxFuture<'static, HookOutcome> + Send + Sync>;

/// How a hook is implemented.
#[derive(Clone)]
pub enum HookAction {
    /// In-process callback.
    Callback(HookHandler),
    /// Shell command receiving the JSON payload on stdin.
    Command {
        /// Command line, run through `sh -c`.
        command: String,
        /// Wait bound for the command.
        timeout: Duration,
    },
}

impl std::fmt::Debug for HookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::Command { command, timeout } => f
                .debug_struct("Command")
                .field("command", command)
                .field("timeout", timeout)
                .finish(),
        }
    }
}

/// One registered hook.
#[derive(Debug, Clone)]
pub struct HookDefinition {
    /// Event the hook fires on.
    pub event: HookEvent,
    /// Optional regex applied to the context subject.
    pub matcher: Option<Regex>,
    /// Hooks for one event run in descending priority order.
    pub priority: i32,
    /// Implementation.
    pub action: HookAction,
}

impl HookDefinition {
    /// Default timeout for command hooks.
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

    /// A synchronous in-process hook at priority 0.
    #[must_use]
    pub fn callback<F>(event: HookEvent, handler: F) -> Self
    where
        F: Fn(&HookContext) -> HookOutcome + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            event,
            matcher: None,
            priority: 0,
            action: HookAction::Callback(Arc::new(move |ctx| {
                let handler = Arc::clone(&handler);
                let fut: BoxFuture<'static, HookOutcome> =
                    Box::pin(async move { handler(&ctx) });
                fut
            })),
        }
    }

    /// An asynchronous in-process hook at priority 0.
    #[must_use]
    pub fn callback_async(event: HookEvent, handler: HookHandler) -> Self {
        Self {
            event,
            matcher: None,
            priority: 0,
            action: HookAction::Callback(handler),
        }
    }

    /// A shell-command hook at priority 0 with the default timeout.
    #[must_use]
    pub fn command(event: HookEvent, command: impl Into<String>) -> Self {
        Self {
            event,
            matcher: None,
            priority: 0,
            action: HookAction::Command {
                command: command.into(),
                timeout: Self::COMMAND_TIMEOUT,
            },
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the subject matcher.
    pub fn matcher(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidMatcher {
            matcher: pattern.to_string(),
            reason: err.to_string(),
        })?;
        self.matcher = Some(regex);
        Ok(self)
    }

    /// Set the command timeout (command hooks only).
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        if let HookAction::Command { timeout: slot, .. } = &mut self.action {
            *slot = timeout;
        }
        self
    }
}

/// Priority-ordered hook dispatcher for one chat.
#[derive(Debug, Default)]
pub struct HookExecutor {
    hooks: Vec<HookDefinition>,
}

impl HookExecutor {
    /// Build an executor from a hook list.
    #[must_use]
    pub fn new(hooks: Vec<HookDefinition>) -> Self {
        let mut executor = Self { hooks };
        executor.sort();
        executor
    }

    fn sort(&mut self) {
        // Stable sort keeps registration order among equal priorities.
        self.hooks.sort_by_key(|hook| std::cmp::Reverse(hook.priority));
    }

    /// Register a hook dynamically.
    pub fn add(&mut self, hook: HookDefinition) {
        self.hooks.push(hook);
        self.sort();
    }

    /// Whether any hook listens on `event`.
    #[must_use]
    pub fn listens(&self, event: HookEvent) -> bool {
        self.hooks.iter().any(|hook| hook.event == event)
    }

    /// Dispatch an event.
    ///
    /// Hooks whose matcher does not match the context subject are skipped.
    /// The first non-[`HookOutcome::Continue`] result wins.
    pub async fn run(&self, ctx: &HookContext) -> HookOutcome {
        for hook in &self.hooks {
            if hook.event != ctx.event {
                continue;
            }
            if let Some(matcher) = &hook.matcher {
                if !matcher.is_match(&ctx.subject) {
                    continue;
                }
            }
            let outcome = match &hook.action {
                HookAction::Callback(handler) => handler(ctx.clone()).await,
                HookAction::Command { command, timeout } => {
                    command::run_command_hook(command, *timeout, ctx).await
                }
            };
            if !outcome.is_continue() {
                return outcome;
            }
        }
        HookOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_order_and_short_circuit() {
        let hooks = vec![
            HookDefinition::callback(HookEvent::PreToolUse, |_| {
                HookOutcome::Halt("low wins?".into())
            })
            .priority(1),
            HookDefinition::callback(HookEvent::PreToolUse, |_| {
                HookOutcome::Halt("high wins".into())
            })
            .priority(10),
        ];
        let executor = HookExecutor::new(hooks);
        let ctx = HookContext::new(HookEvent::PreToolUse, "lead", "team");
        assert_eq!(executor.run(&ctx).await, HookOutcome::Halt("high wins".into()));
    }

    #[tokio::test]
    async fn matcher_filters_by_subject() {
        let hooks = vec![
            HookDefinition::callback(HookEvent::PreToolUse, |_| {
                HookOutcome::Halt("bash blocked".into())
            })
            .matcher("^Bash$")
            .expect("valid matcher"),
        ];
        let executor = HookExecutor::new(hooks);

        let bash = HookContext::new(HookEvent::PreToolUse, "lead", "team")
            .tool_call("Bash", serde_json::json!({}));
        assert!(!executor.run(&bash).await.is_continue());

        let read = HookContext::new(HookEvent::PreToolUse, "lead", "team")
            .tool_call("Read", serde_json::json!({}));
        assert!(executor.run(&read).await.is_continue());
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let hooks = vec![HookDefinition::callback(HookEvent::SwarmStop, |_| {
            HookOutcome::Reprompt("again".into())
        })];
        let executor = HookExecutor::new(hooks);
        let ctx = HookContext::new(HookEvent::UserPrompt, "lead", "team");
        assert!(executor.run(&ctx).await.is_continue());
    }

    #[test]
    fn event_names_roundtrip() {
        for event in [
            HookEvent::SwarmStart,
            HookEvent::UserPrompt,
            HookEvent::PostDelegation,
            HookEvent::BreakpointExit,
        ] {
            let parsed: HookEvent = event.as_str().parse().expect("roundtrip");
            assert_eq!(parsed, event);
        }
        assert!("not_an_event".parse::<HookEvent>().is_err());
    }
}
