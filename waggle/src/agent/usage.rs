//! Token and cost accounting derived from the message log.
//!
//! Providers report `input_tokens` as the full prompt size of each request,
//! so the context-relevant input count is the *last* assistant message's
//! value, while billing sums every request. Both views are pure functions
//! over the log; nothing is accumulated out of band.

use crate::message::{Message, Role};
use crate::model::ModelPricing;

/// Aggregated usage and cost for one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSummary {
    /// Prompt tokens of the most recent assistant turn (running total).
    pub input_tokens: u64,
    /// Sum of completion tokens across assistant turns.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Cached prompt tokens of the most recent assistant turn.
    pub cached_tokens: u64,
    /// Billed input cost across all requests, USD.
    pub input_cost: f64,
    /// Billed output cost across all requests, USD.
    pub output_cost: f64,
    /// `input_cost + output_cost`.
    pub total_cost: f64,
}

/// Prompt tokens of the last assistant message, zero when there is none.
#[must_use]
pub fn cumulative_input_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)
        .map_or(0, |message| message.input_tokens)
}

/// Sum of completion tokens over all assistant messages.
#[must_use]
pub fn cumulative_output_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .map(|message| message.output_tokens)
        .sum()
}

/// Cached prompt tokens of the last assistant message.
#[must_use]
pub fn cumulative_cached_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)
        .map_or(0, |message| message.cached_tokens)
}

/// Full usage summary under the given pricing.
#[must_use]
pub fn summarize(messages: &[Message], pricing: ModelPricing) -> UsageSummary {
    let mut input_cost = 0.0;
    let mut output_cost = 0.0;
    for message in messages {
        if message.role != Role::Assistant {
            continue;
        }
        let fresh = message.input_tokens.saturating_sub(message.cached_tokens) as f64;
        let cached = message.cached_tokens as f64;
        input_cost += fresh / 1_000_000.0 * pricing.input_per_mtok
            + cached / 1_000_000.0 * pricing.cached_per_mtok;
        output_cost += message.output_tokens as f64 / 1_000_000.0 * pricing.output_per_mtok;
    }

    let input_tokens = cumulative_input_tokens(messages);
    let output_tokens = cumulative_output_tokens(messages);
    UsageSummary {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens + output_tokens,
        cached_tokens: cumulative_cached_tokens(messages),
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(input: u64, output: u64) -> Message {
        let mut message = Message::assistant("turn");
        message.input_tokens = input;
        message.output_tokens = output;
        message
    }

    #[test]
    fn input_is_last_assistant_value() {
        let messages = vec![
            Message::user("q1"),
            assistant(100, 10),
            Message::user("q2"),
            assistant(250, 20),
        ];
        assert_eq!(cumulative_input_tokens(&messages), 250);
        assert_eq!(cumulative_output_tokens(&messages), 30);
    }

    #[test]
    fn empty_log_is_zero() {
        assert_eq!(cumulative_input_tokens(&[]), 0);
        let only_user = vec![Message::user("q")];
        assert_eq!(cumulative_input_tokens(&only_user), 0);
    }

    #[test]
    fn costs_sum_every_request() {
        let pricing = ModelPricing {
            input_per_mtok: 2.0,
            output_per_mtok: 10.0,
            cached_per_mtok: 1.0,
        };
        let messages = vec![assistant(1_000_000, 0), assistant(1_000_000, 100_000)];
        let summary = summarize(&messages, pricing);
        // Two requests of 1M fresh input each, one 100k output.
        assert!((summary.input_cost - 4.0).abs() < 1e-9);
        assert!((summary.output_cost - 1.0).abs() < 1e-9);
        assert!((summary.total_cost - 5.0).abs() < 1e-9);
        // Context view stays at the last request.
        assert_eq!(summary.input_tokens, 1_000_000);
    }

    #[test]
    fn cached_tokens_bill_at_cached_rate() {
        let pricing = ModelPricing {
            input_per_mtok: 2.0,
            output_per_mtok: 10.0,
            cached_per_mtok: 0.5,
        };
        let mut message = assistant(1_000_000, 0);
        message.cached_tokens = 500_000;
        let summary = summarize(&[message], pricing);
        // 500k fresh at $2/M + 500k cached at $0.5/M.
        assert!((summary.input_cost - 1.25).abs() < 1e-9);
    }
}
