//! Structured event stream for swarm observers.
//!
//! Every state transition in the runtime is published as a [`SwarmEvent`]
//! wrapped in a [`LogRecord`] carrying the emitting agent and an ISO-8601 UTC
//! timestamp. Consumers register plain callbacks via [`LogStream::on_log`];
//! emission is synchronous and must never block on a subscriber.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed runtime event.
///
/// Serialized with a snake_case `type` tag so that JSON-line consumers can
/// filter without knowing the full schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SwarmEvent {
    /// An `execute` call began.
    SwarmStart {
        /// Swarm name.
        swarm: String,
        /// Execution id for this call.
        execution_id: String,
    },
    /// An `execute` call finished (always emitted, even on error).
    SwarmStop {
        /// Swarm name.
        swarm: String,
        /// Whether execution finished gracefully.
        success: bool,
    },
    /// An agent instance was constructed.
    AgentStart {
        /// Model bound to the agent.
        model: String,
    },
    /// The model returned an assistant turn containing tool calls.
    AgentStep {
        /// Names of the requested tools, in provider order.
        tools: Vec<String>,
    },
    /// The model returned a final, content-only assistant turn.
    AgentStop {
        /// Finish reason recorded by a hook, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    /// A user prompt entered an agent's conversation.
    UserPrompt {
        /// The prompt text.
        prompt: String,
    },
    /// A tool call is about to execute.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Correlation id.
        tool_call_id: String,
        /// Call arguments.
        arguments: Value,
    },
    /// A tool call finished.
    ToolResult {
        /// Tool name.
        tool: String,
        /// Correlation id.
        tool_call_id: String,
        /// Whether the result is a `<tool_use_error>`.
        is_error: bool,
        /// Size of the result content in bytes.
        bytes: usize,
    },
    /// A delegation call left the calling agent.
    AgentDelegation {
        /// Target agent name.
        target: String,
        /// Correlation id of the delegation tool call.
        tool_call_id: String,
    },
    /// A delegation call returned to the calling agent.
    DelegationResult {
        /// Target agent name.
        target: String,
        /// Correlation id of the delegation tool call.
        tool_call_id: String,
        /// Size of the returned content in bytes.
        bytes: usize,
    },
    /// Context usage crossed a warning threshold.
    ContextLimitWarning {
        /// The threshold crossed, in percent.
        threshold: u8,
        /// Current usage, in percent.
        usage_percentage: f64,
    },
    /// Old tool results were compressed to reclaim context.
    ContextCompression {
        /// Number of messages whose content was replaced.
        compressed_messages: usize,
        /// Bytes removed from the log.
        saved_bytes: usize,
    },
    /// A model id was not found in the catalog but was assumed to exist.
    ModelLookupWarning {
        /// The unresolved model id.
        model: String,
    },
    /// A retryable provider error triggered another attempt.
    LlmRetryAttempt {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured maximum retries.
        max_retries: u32,
        /// Delay before the retry, in seconds.
        delay_secs: u64,
        /// Display of the underlying error.
        error: String,
    },
    /// All retries were consumed without success.
    LlmRetryExhausted {
        /// Number of retries performed.
        attempts: u32,
        /// Display of the final error.
        error: String,
    },
    /// A non-retryable provider error was converted into an assistant message.
    LlmRequestFailed {
        /// HTTP status, when the failure was an HTTP error.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Display of the error.
        error: String,
    },
    /// Orphaned assistant tool calls were pruned before a retry.
    OrphanToolCallsPruned {
        /// Number of calls removed.
        pruned_count: usize,
        /// Rendered form of each removed call.
        calls: Vec<String>,
    },
    /// A skill search ran against the agent's memory.
    SemanticSkillSearch {
        /// The similarity threshold applied.
        threshold: f64,
        /// Number of results returned.
        hits: usize,
    },
    /// A general memory search ran against the agent's memory.
    SemanticMemorySearch {
        /// Number of results returned.
        hits: usize,
    },
    /// The execution timeout fired and cancelled in-flight work.
    ExecutionTimeout {
        /// The configured limit in seconds.
        limit: u64,
    },
}

/// A [`SwarmEvent`] with its envelope: timestamp and emitting agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Agent that emitted the event, when agent-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// The event payload.
    #[serde(flatten)]
    pub event: SwarmEvent,
}

/// Identifier returned by [`LogStream::on_log`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Box<dyn Fn(&LogRecord) + Send + Sync>;

#[derive(Default)]
struct StreamInner {
    enabled: AtomicBool,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    collected: Mutex<Option<Vec<LogRecord>>>,
}

/// Single-producer, multi-subscriber event bus.
///
/// Cloning is cheap and shares the underlying subscriber list. The stream is
/// created enabled; [`LogStream::reset`] drops all subscribers and any
/// collected records between executions.
#[derive(Clone)]
pub struct LogStream {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStream {
    /// Create a new, enabled stream with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let inner = StreamInner::default();
        inner.enabled.store(true, Ordering::SeqCst);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Whether emission is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable emission.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Register a subscriber callback. Returns an id for [`Self::unsubscribe`].
    pub fn on_log<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut subscribers) = self.inner.subscribers.write() {
            subscribers.push((id, Box::new(callback)));
        }
        SubscriberId(id)
    }

    /// Remove a previously registered subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Ok(mut subscribers) = self.inner.subscribers.write() {
            subscribers.retain(|(existing, _)| *existing != id.0);
        }
    }

    /// Register a subscriber that writes one JSON object per line.
    pub fn on_log_jsonl<W>(&self, writer: W) -> SubscriberId
    where
        W: Write + Send + 'static,
    {
        let writer = Mutex::new(writer);
        self.on_log(move |record| {
            if let (Ok(mut writer), Ok(line)) = (writer.lock(), serde_json::to_string(record)) {
                let _ = writeln!(writer, "{line}");
            }
        })
    }

    /// Start collecting emitted records for the current execution.
    pub fn begin_collection(&self) {
        if let Ok(mut collected) = self.inner.collected.lock() {
            *collected = Some(Vec::new());
        }
    }

    /// Take the records collected since [`Self::begin_collection`].
    #[must_use]
    pub fn take_collected(&self) -> Vec<LogRecord> {
        self.inner
            .collected
            .lock()
            .ok()
            .and_then(|mut collected| collected.take())
            .unwrap_or_default()
    }

    /// Publish an event to all subscribers. Never blocks on a consumer.
    pub fn emit(&self, agent: Option<&str>, event: SwarmEvent) {
        if !self.is_enabled() {
            return;
        }
        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            agent: agent.map(str::to_string),
            event,
        };
        if let Ok(mut collected) = self.inner.collected.lock() {
            if let Some(records) = collected.as_mut() {
                records.push(record.clone());
            }
        }
        if let Ok(subscribers) = self.inner.subscribers.read() {
            for (_, subscriber) in subscribers.iter() {
                subscriber(&record);
            }
        }
    }

    /// Drop all subscribers and collected records.
    pub fn reset(&self) {
        if let Ok(mut subscribers) = self.inner.subscribers.write() {
            subscribers.clear();
        }
        if let Ok(mut collected) = self.inner.collected.lock() {
            *collected = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribers_receive_events() {
        let stream = LogStream::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        stream.on_log(move |record| {
            assert_eq!(record.agent.as_deref(), Some("lead"));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        stream.emit(
            Some("lead"),
            SwarmEvent::UserPrompt {
                prompt: "hi".into(),
            },
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_stream_is_silent() {
        let stream = LogStream::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        stream.on_log(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        stream.set_enabled(false);
        stream.emit(None, SwarmEvent::ExecutionTimeout { limit: 1 });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn collection_drains_once() {
        let stream = LogStream::new();
        stream.begin_collection();
        stream.emit(
            Some("lead"),
            SwarmEvent::AgentStep {
                tools: vec!["Read".into()],
            },
        );
        let records = stream.take_collected();
        assert_eq!(records.len(), 1);
        assert!(stream.take_collected().is_empty());
    }

    #[test]
    fn record_serializes_with_type_tag() {
        let record = LogRecord {
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            agent: Some("lead".into()),
            event: SwarmEvent::ContextLimitWarning {
                threshold: 60,
                usage_percentage: 61.5,
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["type"], "context_limit_warning");
        assert_eq!(value["threshold"], 60);
        assert_eq!(value["agent"], "lead");
    }

    #[test]
    fn unsubscribe_removes_callback() {
        let stream = LogStream::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = stream.on_log(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        stream.unsubscribe(id);
        stream.emit(None, SwarmEvent::ExecutionTimeout { limit: 5 });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
