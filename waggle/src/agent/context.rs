//! Context-window bookkeeping: warning thresholds and compression.

use std::collections::BTreeSet;

use crate::message::{Content, Message, Role};

use super::usage;

/// Percentage thresholds that fire a `context_limit_warning` once each.
pub const WARNING_THRESHOLDS: [u8; 4] = [60, 80, 90, 95];

/// Usage percentage at which compression kicks in.
pub const COMPRESSION_THRESHOLD: f64 = 60.0;

/// Number of most recent messages compression never touches.
pub const KEEP_RECENT: usize = 10;

/// Per-chat context state, carried into snapshots.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    /// Input-token budget of the model.
    pub context_limit: u64,
    /// Warning thresholds already fired.
    pub thresholds_hit: BTreeSet<u8>,
    /// Whether compression has run for the current window.
    pub compression_applied: bool,
    /// Index of the last `TodoWrite` result in the message log.
    pub last_todowrite_index: Option<usize>,
}

impl ContextTracker {
    /// Tracker for a model with the given window.
    #[must_use]
    pub fn new(context_limit: u64) -> Self {
        Self {
            context_limit,
            thresholds_hit: BTreeSet::new(),
            compression_applied: false,
            last_todowrite_index: None,
        }
    }

    /// Current context usage in percent.
    #[must_use]
    pub fn usage_percentage(&self, messages: &[Message]) -> f64 {
        if self.context_limit == 0 {
            return 0.0;
        }
        let used =
            usage::cumulative_input_tokens(messages) + usage::cumulative_output_tokens(messages);
        used as f64 / self.context_limit as f64 * 100.0
    }

    /// Tokens left in the window.
    #[must_use]
    pub fn tokens_remaining(&self, messages: &[Message]) -> u64 {
        let used =
            usage::cumulative_input_tokens(messages) + usage::cumulative_output_tokens(messages);
        self.context_limit.saturating_sub(used)
    }

    /// Thresholds newly crossed at `percentage`; each is marked as fired.
    pub fn crossed_thresholds(&mut self, percentage: f64) -> Vec<u8> {
        let mut crossed = Vec::new();
        for threshold in WARNING_THRESHOLDS {
            if percentage >= f64::from(threshold) && self.thresholds_hit.insert(threshold) {
                crossed.push(threshold);
            }
        }
        crossed
    }

    /// Whether compression should run at `percentage`.
    #[must_use]
    pub fn should_compress(&self, percentage: f64) -> bool {
        !self.compression_applied && percentage >= COMPRESSION_THRESHOLD
    }

    /// Replace the content of old tool results with a short placeholder.
    ///
    /// The most recent [`KEEP_RECENT`] messages are left untouched; earlier
    /// `tool` messages keep their `tool_call_id` so the log stays coherent.
    /// Returns `(compressed_count, saved_bytes)`.
    pub fn compress(&mut self, messages: &mut [Message]) -> (usize, usize) {
        let cutoff = messages.len().saturating_sub(KEEP_RECENT);
        let mut compressed = 0;
        let mut saved = 0;
        for message in &mut messages[..cutoff] {
            if message.role != Role::Tool {
                continue;
            }
            let Some(content) = &message.content else {
                continue;
            };
            let size = content.len();
            let placeholder = format!("[compressed: {size} bytes]");
            if content.text() == placeholder {
                continue;
            }
            saved += size.saturating_sub(placeholder.len());
            message.content = Some(Content::Text(placeholder));
            compressed += 1;
        }
        self.compression_applied = true;
        (compressed, saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_message(id: &str, size: usize) -> Message {
        Message::tool(id, "x".repeat(size))
    }

    fn assistant(input: u64, output: u64) -> Message {
        let mut message = Message::assistant("turn");
        message.input_tokens = input;
        message.output_tokens = output;
        message
    }

    #[test]
    fn usage_percentage_tracks_last_turn() {
        let tracker = ContextTracker::new(100_000);
        let messages = vec![assistant(59_000, 1_000)];
        assert!((tracker.usage_percentage(&messages) - 60.0).abs() < 1e-9);
        assert_eq!(tracker.tokens_remaining(&messages), 40_000);
    }

    #[test]
    fn thresholds_fire_once() {
        let mut tracker = ContextTracker::new(100_000);
        assert_eq!(tracker.crossed_thresholds(65.0), vec![60]);
        assert_eq!(tracker.crossed_thresholds(70.0), Vec::<u8>::new());
        assert_eq!(tracker.crossed_thresholds(92.0), vec![80, 90]);
        assert_eq!(tracker.crossed_thresholds(99.0), vec![95]);
    }

    #[test]
    fn compression_replaces_old_tool_results() {
        let mut tracker = ContextTracker::new(100_000);
        let mut messages: Vec<Message> = Vec::new();
        for index in 0..8 {
            messages.push(tool_message(&format!("call_{index}"), 500));
        }
        // Ten recent messages that must stay intact.
        for index in 0..10 {
            messages.push(Message::user(format!("recent {index}")));
        }

        let (count, saved) = tracker.compress(&mut messages);
        assert_eq!(count, 8);
        assert!(saved > 0);
        assert!(tracker.compression_applied);
        for message in &messages[..8] {
            assert_eq!(message.text(), Some("[compressed: 500 bytes]"));
            assert!(message.tool_call_id.is_some());
        }
        for message in &messages[8..] {
            assert!(!message.text().unwrap_or_default().starts_with("[compressed"));
        }
    }

    #[test]
    fn recent_tool_results_are_kept() {
        let mut tracker = ContextTracker::new(100_000);
        let mut messages: Vec<Message> = (0..5)
            .map(|index| tool_message(&format!("call_{index}"), 100))
            .collect();
        let (count, _) = tracker.compress(&mut messages);
        // All five are within the most recent ten.
        assert_eq!(count, 0);
    }

    #[test]
    fn compression_flag_blocks_repeat() {
        let mut tracker = ContextTracker::new(100_000);
        tracker.compress(&mut []);
        assert!(!tracker.should_compress(75.0));
    }
}
