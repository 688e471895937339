//! The swarm run loop.
//!
//! `execute` installs the execution scope, runs the lead agent to a final
//! answer (re-entering on `swarm_stop` reprompts), and always winds down the
//! same way whether the body finished, failed, or timed out: terminal
//! `swarm_stop` event, plugin notification, and collected logs. The execution
//! timeout drops the whole body future, which cancels every in-flight tool
//! and delegation at its next suspension point.

use std::time::{Duration, Instant};

use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Error;
use crate::events::{LogRecord, SwarmEvent};
use crate::hooks::{HookEvent, HookOutcome};

use super::scope::{self, ExecutionScope};
use super::Swarm;

/// Execution metadata attached to every result.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    /// Id of this `execute` call.
    pub execution_id: String,
    /// Whether the execution timeout fired.
    pub timeout: bool,
    /// Number of `swarm_stop` reprompts taken.
    pub reprompts: u32,
}

/// Outcome of one `execute` call.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Final assistant content; absent on hard failure or timeout.
    pub content: Option<String>,
    /// The lead agent that produced the content.
    pub agent: String,
    /// Hard failure, if any. Graceful LLM failures surface as `content`.
    pub error: Option<Error>,
    /// Events collected during the execution.
    pub logs: Vec<LogRecord>,
    /// Wall-clock duration of the call.
    pub duration: Duration,
    /// Execution metadata.
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    /// Whether execution finished gracefully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Swarm {
    /// Run one prompt through the lead agent to completion.
    #[instrument(skip(self, prompt), fields(swarm = %self.name()))]
    pub async fn execute(&self, prompt: &str) -> ExecutionResult {
        let started = Instant::now();
        let execution_id = Uuid::new_v4().to_string();
        let lead = self.lead_name().to_string();
        let log = self.core.services.log.clone();

        let scope = ExecutionScope {
            execution_id: execution_id.clone(),
            swarm_id: self.swarm_id.clone(),
            parent_swarm_id: scope::current().map(|outer| outer.swarm_id),
        };

        log.begin_collection();
        log.emit(
            None,
            SwarmEvent::SwarmStart {
                swarm: self.name().to_string(),
                execution_id: execution_id.clone(),
            },
        );
        self.core.services.plugins.on_swarm_started().await;

        let body = scope::enter(scope, self.run_main_loop(prompt));
        let outcome = match self.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log.emit(
                        None,
                        SwarmEvent::ExecutionTimeout {
                            limit: limit.as_secs(),
                        },
                    );
                    Err(Error::ExecutionTimeout {
                        limit_secs: limit.as_secs(),
                    })
                }
            },
            None => body.await,
        };

        // Wind-down runs on every path.
        log.emit(
            None,
            SwarmEvent::SwarmStop {
                swarm: self.name().to_string(),
                success: outcome.is_ok(),
            },
        );
        self.core.services.plugins.on_swarm_stopped().await;
        let logs = log.take_collected();
        let duration = started.elapsed();

        match outcome {
            Ok((content, reprompts)) => ExecutionResult {
                content,
                agent: lead,
                error: None,
                logs,
                duration,
                metadata: ExecutionMetadata {
                    execution_id,
                    timeout: false,
                    reprompts,
                },
            },
            Err(error) => {
                let timeout = matches!(error, Error::ExecutionTimeout { .. });
                ExecutionResult {
                    content: None,
                    agent: lead,
                    error: Some(error),
                    logs,
                    duration,
                    metadata: ExecutionMetadata {
                        execution_id,
                        timeout,
                        reprompts: 0,
                    },
                }
            }
        }
    }

    /// Lead loop: ask, consult `swarm_stop` hooks, loop on reprompt.
    async fn run_main_loop(&self, prompt: &str) -> Result<(Option<String>, u32), Error> {
        let chat = self.lead_chat().await?;

        {
            let guard = chat.lock().await;
            if let HookOutcome::Halt(message) = guard
                .run_lifecycle_hook(HookEvent::SwarmStart, json!({"prompt": prompt}))
                .await
            {
                return Ok((Some(message), 0));
            }
        }

        let mut prompt = prompt.to_string();
        let mut reprompts = 0;
        loop {
            let ask = {
                let mut guard = chat.lock().await;
                guard.ask_with_signal(&prompt).await?
            };
            if let Some(content) = ask.finish_swarm {
                return Ok((Some(content), reprompts));
            }
            let content = ask.message.text().map(str::to_string);
            let outcome = {
                let guard = chat.lock().await;
                guard
                    .run_lifecycle_hook(HookEvent::SwarmStop, json!({"content": content}))
                    .await
            };
            match outcome {
                HookOutcome::Reprompt(next) => {
                    prompt = next;
                    reprompts += 1;
                }
                HookOutcome::Replace(replacement) | HookOutcome::Halt(replacement) => {
                    return Ok((Some(replacement), reprompts));
                }
                _ => return Ok((content, reprompts)),
            }
        }
    }
}
