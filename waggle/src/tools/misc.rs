//! In-memory bookkeeping tools: todo list, scratch thinking, and the clock.
//!
//! None of these touch the filesystem or network, and none can be removed by
//! a skill restriction.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput, parse_args};

/// Replaces the agent's in-memory todo list.
#[derive(Debug, Default)]
pub struct TodoWriteTool {
    items: Mutex<Vec<Value>>,
}

impl TodoWriteTool {
    /// Create an empty todo list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current todo items.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct TodoArgs {
    todos: Vec<Value>,
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "TodoWrite"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "TodoWrite",
            "Replace the task list used to track progress on multi-step work.",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {"type": "object"},
                        "description": "The full new task list."
                    }
                },
                "required": ["todos"]
            }),
        )
    }

    fn removable(&self) -> bool {
        false
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: TodoArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let count = args.todos.len();
        if let Ok(mut items) = self.items.lock() {
            *items = args.todos;
        }
        ToolOutput::ok(format!("Todo list updated ({count} items)"))
    }
}

/// Records a thought without any side effect.
#[derive(Debug, Clone, Copy)]
pub struct ThinkTool;

#[derive(Deserialize)]
struct ThinkArgs {
    #[allow(dead_code)]
    thought: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "Think"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Think",
            "Write out reasoning without taking any action. Use for planning between steps.",
            json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string", "description": "The reasoning to record."}
                },
                "required": ["thought"]
            }),
        )
    }

    fn removable(&self) -> bool {
        false
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        if let Err(output) = parse_args::<ThinkArgs>(self.name(), &args) {
            return output;
        }
        ToolOutput::ok("Thought recorded.")
    }
}

/// Reports the current UTC time.
#[derive(Debug, Clone, Copy)]
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "Clock"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Clock",
            "Get the current date and time in UTC.",
            json!({"type": "object", "properties": {}}),
        )
    }

    fn removable(&self) -> bool {
        false
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
        ToolOutput::ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::new("lead", ".")
    }

    #[tokio::test]
    async fn todo_write_replaces_list() {
        let tool = TodoWriteTool::new();
        let output = tool
            .call(
                &ctx(),
                json!({"todos": [{"task": "a"}, {"task": "b"}]}),
            )
            .await;
        assert!(!output.is_error());
        assert_eq!(tool.items().len(), 2);

        tool.call(&ctx(), json!({"todos": [{"task": "c"}]})).await;
        assert_eq!(tool.items().len(), 1);
    }

    #[tokio::test]
    async fn think_has_no_side_effects() {
        let output = ThinkTool.call(&ctx(), json!({"thought": "hmm"})).await;
        assert!(!output.is_error());
    }

    #[tokio::test]
    async fn clock_reports_utc() {
        let output = ClockTool.call(&ctx(), json!({})).await;
        assert!(output.content().ends_with('Z'));
    }
}
