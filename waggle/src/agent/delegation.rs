//! Delegation tools.
//!
//! Each `delegates_to` edge synthesizes a tool the model can call like any
//! other. The chat loop intercepts these calls by name and routes them to the
//! target agent's conversation instead of a tool implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput};

/// Derived tool name for delegating to `target`.
///
/// Underscored and dashed names convert component-wise:
/// `slack_agent` becomes `WorkWithSlackAgent`.
#[must_use]
pub fn delegation_tool_name(target: &str) -> String {
    let pascal: String = target
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    format!("WorkWith{pascal}")
}

/// One resolved delegation edge on a chat.
#[derive(Debug, Clone)]
pub struct DelegationEdge {
    /// Target agent name.
    pub target: String,
    /// Whether the target's singleton conversation is shared.
    pub preserve_context: bool,
}

/// Arguments of a delegation call.
#[derive(Debug, Deserialize)]
pub struct DelegationArgs {
    /// The task handed to the target agent.
    pub prompt: String,
    /// Optional background prepended to the prompt.
    #[serde(default)]
    pub context: Option<String>,
}

impl DelegationArgs {
    /// The full prompt sent to the target.
    #[must_use]
    pub fn full_prompt(&self) -> String {
        match &self.context {
            Some(context) if !context.is_empty() => {
                format!("{context}\n\n{}", self.prompt)
            }
            _ => self.prompt.clone(),
        }
    }
}

/// Registry entry backing a delegation tool.
///
/// Only the definition matters: the chat loop dispatches delegation calls
/// itself, so `call` is never reached in normal operation.
#[derive(Debug, Clone)]
pub struct DelegationTool {
    name: String,
    target: String,
    description: String,
}

impl DelegationTool {
    /// Build the tool for an edge.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        target_description: &str,
    ) -> Self {
        let target = target.into();
        let description = if target_description.is_empty() {
            format!("Delegate a task to the '{target}' agent and return its final answer.")
        } else {
            format!(
                "Delegate a task to the '{target}' agent ({target_description}) and return its \
                 final answer."
            )
        };
        Self {
            name: name.into(),
            target,
            description,
        }
    }

    /// The target agent name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Tool for DelegationTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name.clone(),
            self.description.clone(),
            json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Detailed description of the task to delegate."
                    },
                    "context": {
                        "type": "string",
                        "description": "Background the target agent needs to do the work."
                    }
                },
                "required": ["prompt"]
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
        ToolOutput::error(format!(
            "{}: delegation calls are dispatched by the runtime",
            self.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_pascal_cased() {
        assert_eq!(delegation_tool_name("researcher"), "WorkWithResearcher");
        assert_eq!(delegation_tool_name("slack_agent"), "WorkWithSlackAgent");
        assert_eq!(delegation_tool_name("data-loader"), "WorkWithDataLoader");
        assert_eq!(delegation_tool_name("a_b_c"), "WorkWithABC");
    }

    #[test]
    fn context_is_prepended() {
        let args = DelegationArgs {
            prompt: "summarize the report".into(),
            context: Some("the report is in scratchpad under 'report'".into()),
        };
        assert_eq!(
            args.full_prompt(),
            "the report is in scratchpad under 'report'\n\nsummarize the report"
        );

        let bare = DelegationArgs {
            prompt: "just this".into(),
            context: None,
        };
        assert_eq!(bare.full_prompt(), "just this");
    }
}
