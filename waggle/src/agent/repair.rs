//! Orphan tool-call repair.
//!
//! A provider 400 that complains about tool-call bookkeeping almost always
//! means the log holds assistant tool calls with no matching results (an
//! earlier cancellation or crash). One repair pass prunes those calls,
//! deletes assistant messages left empty, and appends a user-visible
//! system reminder so the model knows what disappeared.

use std::collections::HashSet;

use crate::message::{Message, Role};

/// One pruned call, for the reminder and the pruning event.
#[derive(Debug, Clone)]
pub struct PrunedCall {
    /// The orphaned call id.
    pub id: String,
    /// Rendered form, e.g. `Read(file_path: "x")`.
    pub rendered: String,
}

/// Remove assistant tool calls that have no matching tool result.
///
/// Returns the pruned calls, empty when the log was already consistent.
pub fn prune_orphan_tool_calls(messages: &mut Vec<Message>) -> Vec<PrunedCall> {
    let answered: HashSet<String> = messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .filter_map(|message| message.tool_call_id.clone())
        .collect();

    let mut pruned = Vec::new();
    let mut index = 0;
    while index < messages.len() {
        let message = &mut messages[index];
        if message.role != Role::Assistant || message.tool_calls.is_empty() {
            index += 1;
            continue;
        }
        let (kept, orphaned): (Vec<_>, Vec<_>) = message
            .tool_calls
            .drain(..)
            .partition(|call| answered.contains(&call.id));
        for call in orphaned {
            pruned.push(PrunedCall {
                rendered: call.render(),
                id: call.id,
            });
        }
        message.tool_calls = kept;
        if message.tool_calls.is_empty() && message.content.is_none() {
            messages.remove(index);
        } else {
            index += 1;
        }
    }
    pruned
}

/// The system reminder appended after a prune, listing the removed calls.
#[must_use]
pub fn repair_reminder(pruned: &[PrunedCall]) -> String {
    let listing: Vec<&str> = pruned.iter().map(|call| call.rendered.as_str()).collect();
    format!(
        "<system-reminder>The following tool calls were interrupted before returning results \
         and have been removed from the conversation: {}. Re-issue them if their results are \
         still needed.</system-reminder>",
        listing.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    #[test]
    fn consistent_log_is_untouched() {
        let mut messages = vec![
            Message::user("q"),
            Message::assistant("calling").with_tool_calls(vec![ToolCall::new(
                "call_1",
                "Read",
                json!({"file_path": "x"}),
            )]),
            Message::tool("call_1", "contents"),
        ];
        let pruned = prune_orphan_tool_calls(&mut messages);
        assert!(pruned.is_empty());
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn orphaned_calls_are_pruned_and_message_deleted_when_empty() {
        let mut messages = vec![
            Message::user("q"),
            Message {
                content: None,
                ..Message::assistant("")
            }
            .with_tool_calls(vec![
                ToolCall::new("call_a", "Read", json!({"file_path": "x"})),
                ToolCall::new("call_b", "Bash", json!({"command": "ls"})),
            ]),
        ];
        let pruned = prune_orphan_tool_calls(&mut messages);
        assert_eq!(pruned.len(), 2);
        // The assistant message had no content, so it is gone entirely.
        assert_eq!(messages.len(), 1);

        let reminder = repair_reminder(&pruned);
        assert!(reminder.contains(r#"Read(file_path: "x")"#));
        assert!(reminder.contains(r#"Bash(command: "ls")"#));
    }

    #[test]
    fn content_is_preserved_when_only_calls_are_dropped() {
        let mut messages = vec![
            Message::assistant("partial answer").with_tool_calls(vec![ToolCall::new(
                "call_a",
                "Read",
                json!({"file_path": "x"}),
            )]),
        ];
        let pruned = prune_orphan_tool_calls(&mut messages);
        assert_eq!(pruned.len(), 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some("partial answer"));
        assert!(messages[0].tool_calls.is_empty());
    }

    #[test]
    fn answered_calls_survive_alongside_orphans() {
        let mut messages = vec![
            Message {
                content: None,
                ..Message::assistant("")
            }
            .with_tool_calls(vec![
                ToolCall::new("call_ok", "Read", json!({"file_path": "a"})),
                ToolCall::new("call_orphan", "Read", json!({"file_path": "b"})),
            ]),
            Message::tool("call_ok", "contents"),
        ];
        let pruned = prune_orphan_tool_calls(&mut messages);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id, "call_orphan");
        assert_eq!(messages[0].tool_calls.len(), 1);
        assert_eq!(messages[0].tool_calls[0].id, "call_ok");
    }
}
