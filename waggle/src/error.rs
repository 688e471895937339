//! Error types for the waggle runtime.
//!
//! Build-time problems surface as [`ConfigError`] and abort before a swarm is
//! constructed. Provider failures surface as [`LlmError`] and are converted by
//! the retry layer into assistant-visible messages rather than raised through
//! the chat loop. Tool failures never appear here at all: they are rendered as
//! `<tool_use_error>` content by the tool layer.

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The top-level error type for runtime operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid swarm or workflow configuration (fatal at build time).
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// A delegation referenced an agent that does not exist at run time.
    #[error("agent '{agent}' not found in swarm")]
    AgentNotFound {
        /// The missing agent name.
        agent: String,
    },

    /// Provider-side failure that could not be recovered.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Snapshot serialization or restore failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// The whole `execute` call exceeded its configured timeout.
    #[error("execution timed out after {limit_secs} s")]
    ExecutionTimeout {
        /// The configured limit in seconds.
        limit_secs: u64,
    },

    /// A single agent turn exceeded its configured timeout.
    #[error("turn timed out after {limit_secs} s")]
    TurnTimeout {
        /// The configured limit in seconds.
        limit_secs: u64,
    },

    /// Filesystem error outside of tool execution (snapshots, memory store).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error outside of tool execution.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration problems detected while building a swarm or workflow.
///
/// These are fatal: the swarm is never constructed.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Two agents in one swarm share a name.
    #[error("duplicate agent name '{agent}'")]
    DuplicateAgent {
        /// The duplicated name.
        agent: String,
    },

    /// A `delegates_to` entry names an agent that is not in the swarm.
    #[error("agent '{referrer}' delegates to unknown agent '{agent}'")]
    UnknownDelegate {
        /// The agent holding the bad entry.
        referrer: String,
        /// The unresolved target name.
        agent: String,
    },

    /// The delegation graph contains a directed cycle.
    #[error("circular delegation detected: {cycle}")]
    CircularDependency {
        /// Human-readable cycle path, e.g. `A → B → A`.
        cycle: String,
    },

    /// The model is not in the catalog and `assume_model_exists` is off.
    #[error(
        "unknown model '{model}' for agent '{agent}' (set assume_model_exists to skip the catalog check)"
    )]
    UnknownModel {
        /// The agent declaring the model.
        agent: String,
        /// The unresolved model id.
        model: String,
    },

    /// A permission glob or command regex failed to compile.
    #[error("invalid permission pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// A hook matcher regex failed to compile.
    #[error("invalid hook matcher '{matcher}': {reason}")]
    InvalidMatcher {
        /// The offending matcher source.
        matcher: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// A workflow node dependency does not name another node.
    #[error("workflow node '{node}' depends on unknown node '{dependency}'")]
    UnknownNodeDependency {
        /// The node holding the bad entry.
        node: String,
        /// The unresolved dependency name.
        dependency: String,
    },

    /// Any other malformed configuration value.
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a generic configuration error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Provider-side failure modes.
///
/// Each variant carries enough context for the retry layer to classify the
/// failure and for the synthesized assistant message to explain it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    /// The provider returned a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or provider error message.
        message: String,
    },

    /// Connection-level failure (reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured client timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body did not match the expected wire shape.
    #[error("unexpected response shape: {detail}")]
    UnexpectedShape {
        /// Parser diagnostic plus a body excerpt.
        detail: String,
    },

    /// All retry attempts were consumed without a success.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of retries performed.
        attempts: u32,
        /// Display of the final underlying error.
        last: String,
    },

    /// The configured base URL answered with something that is not a chat
    /// completion, which usually means a proxy misconfiguration.
    #[error("provider at '{base_url}' returned an unexpected payload: {detail}")]
    ProxyMisconfigured {
        /// The configured base URL.
        base_url: String,
        /// What came back instead.
        detail: String,
    },
}

impl LlmError {
    /// The HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the retry layer should attempt this call again.
    ///
    /// Server-side statuses (429, 5xx, 529) and transport failures are
    /// retryable; client-side 4xx statuses are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                matches!(*status, 429 | 500 | 502 | 503 | 529)
            }
            Self::Network(_) | Self::Timeout => true,
            _ => false,
        }
    }

    /// Whether this is a 400 whose message points at tool-call bookkeeping,
    /// which triggers the one-shot orphan-call repair pass.
    #[must_use]
    pub fn mentions_tool_use(&self) -> bool {
        match self {
            Self::Http { status: 400, message } => {
                let lower = message.to_lowercase();
                lower.contains("tool_use")
                    || lower.contains("tool_result")
                    || lower.contains("tool_call")
                    || lower.contains("tool")
            }
            _ => false,
        }
    }

    /// A one-line remediation hint for the synthesized assistant message.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Http { status: 401, .. } => "Check that the API key is set and valid.",
            Self::Http { status: 402, .. } => "Check the account's billing status.",
            Self::Http { status: 403, .. } => "The API key lacks access to this model.",
            Self::Http { status: 422, .. } => "The request parameters were rejected; check sampling parameters.",
            Self::Http { .. } => "Inspect the provider response body for details.",
            Self::Network(_) | Self::Timeout => "Check network connectivity to the provider.",
            Self::ProxyMisconfigured { .. } => {
                "The base_url does not point at a chat-completions endpoint; check the proxy configuration."
            }
            _ => "Inspect the runtime logs for details.",
        }
    }
}

/// Snapshot persistence and restore failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    /// The snapshot was produced by an incompatible runtime version.
    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this runtime writes.
        expected: String,
        /// Version found in the snapshot.
        found: String,
    },

    /// A swarm snapshot was fed to an orchestrator restore or vice versa.
    #[error("snapshot type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected snapshot kind.
        expected: String,
        /// Kind found in the snapshot.
        found: String,
    },

    /// The snapshot payload could not be interpreted.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for status in [429, 500, 502, 503, 529] {
            let err = LlmError::Http {
                status,
                message: String::new(),
            };
            assert!(err.is_retryable(), "status {status} should retry");
        }
        for status in [400, 401, 402, 403, 404, 422] {
            let err = LlmError::Http {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {status} should not retry");
        }
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::Timeout.is_retryable());
    }

    #[test]
    fn orphan_repair_trigger() {
        let err = LlmError::Http {
            status: 400,
            message: "unexpected `tool_use_id` found in `tool_result` blocks".into(),
        };
        assert!(err.mentions_tool_use());

        let err = LlmError::Http {
            status: 400,
            message: "max_tokens out of range".into(),
        };
        assert!(!err.mentions_tool_use());

        let err = LlmError::Http {
            status: 500,
            message: "tool_use".into(),
        };
        assert!(!err.mentions_tool_use());
    }

    #[test]
    fn cycle_error_names_path() {
        let err = ConfigError::CircularDependency {
            cycle: "A → B → A".into(),
        };
        assert!(err.to_string().contains("A → B → A"));
    }
}
