//! Retry wrapper around provider calls.
//!
//! Retryable failures (429, 5xx, 529, transport errors) are reattempted with
//! a fixed delay, emitting one `llm_retry_attempt` event per retry and an
//! `llm_retry_exhausted` event when the budget runs out. Non-retryable
//! failures return immediately; the chat loop decides whether they trigger
//! orphan-call repair or an assistant-visible error message.

use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;
use crate::events::{LogStream, SwarmEvent};

use super::{ChatRequest, ChatResponse, Provider};

/// Retry budget and pacing for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Default retry count.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default delay between attempts.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(15);
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            delay: Self::DEFAULT_DELAY,
        }
    }
}

/// Call the provider, retrying retryable failures per `policy`.
///
/// Returns the first success, the first non-retryable error, or
/// [`LlmError::RetriesExhausted`] once the budget is spent.
pub async fn chat_with_retry(
    provider: &dyn Provider,
    request: &ChatRequest,
    policy: &RetryPolicy,
    log: &LogStream,
    agent: &str,
) -> Result<ChatResponse, LlmError> {
    let mut retries_done = 0;
    loop {
        match provider.chat(request).await {
            Ok(response) => return Ok(response),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if retries_done >= policy.max_retries {
                    log.emit(
                        Some(agent),
                        SwarmEvent::LlmRetryExhausted {
                            attempts: retries_done,
                            error: err.to_string(),
                        },
                    );
                    return Err(LlmError::RetriesExhausted {
                        attempts: retries_done,
                        last: err.to_string(),
                    });
                }
                retries_done += 1;
                warn!(
                    agent,
                    attempt = retries_done,
                    max_retries = policy.max_retries,
                    error = %err,
                    "provider call failed, retrying"
                );
                log.emit(
                    Some(agent),
                    SwarmEvent::LlmRetryAttempt {
                        attempt: retries_done,
                        max_retries: policy.max_retries,
                        delay_secs: policy.delay.as_secs(),
                        error: err.to_string(),
                    },
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, SamplingParams};
    use std::sync::{Arc, Mutex};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "mock-model".into(),
            messages: vec![],
            tools: vec![],
            parameters: SamplingParams::default(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_millis(1),
        }
    }

    fn retry_events(log: &LogStream) -> Arc<Mutex<Vec<String>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        log.on_log(move |record| {
            if let Ok(mut events) = sink.lock() {
                if let Ok(value) = serde_json::to_value(record) {
                    events.push(value["type"].as_str().unwrap_or_default().to_string());
                }
            }
        });
        events
    }

    #[tokio::test]
    async fn three_failures_then_success() {
        let provider = MockProvider::new()
            .http_error(500, "a")
            .http_error(502, "b")
            .http_error(503, "c")
            .text("recovered");
        let log = LogStream::new();
        let events = retry_events(&log);

        let response = chat_with_retry(&provider, &request(), &fast_policy(), &log, "lead")
            .await
            .expect("recovers");
        assert_eq!(response.content.expect("content").text(), "recovered");
        assert_eq!(provider.call_count(), 4);

        let seen = events.lock().expect("events");
        assert_eq!(
            seen.iter().filter(|t| *t == "llm_retry_attempt").count(),
            3
        );
        assert_eq!(
            seen.iter().filter(|t| *t == "llm_retry_exhausted").count(),
            0
        );
    }

    #[tokio::test]
    async fn non_retryable_returns_immediately() {
        let provider = MockProvider::new().http_error(401, "Unauthorized");
        let log = LogStream::new();
        let events = retry_events(&log);

        let err = chat_with_retry(&provider, &request(), &fast_policy(), &log, "lead")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(provider.call_count(), 1);
        assert!(events.lock().expect("events").is_empty());
    }

    #[tokio::test]
    async fn exhaustion_emits_event() {
        let provider = MockProvider::new()
            .http_error(500, "a")
            .http_error(500, "b")
            .http_error(500, "c")
            .http_error(500, "d");
        let log = LogStream::new();
        let events = retry_events(&log);

        let err = chat_with_retry(&provider, &request(), &fast_policy(), &log, "lead")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.call_count(), 4);

        let seen = events.lock().expect("events");
        assert_eq!(
            seen.iter().filter(|t| *t == "llm_retry_attempt").count(),
            3
        );
        assert_eq!(
            seen.iter().filter(|t| *t == "llm_retry_exhausted").count(),
            1
        );
    }
}
