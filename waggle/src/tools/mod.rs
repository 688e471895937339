//! Built-in tool catalog.
//!
//! These are the file, shell, HTTP, and bookkeeping tools every agent may be
//! granted. Each instance is constructed per chat, so stateful tools (the
//! todo list) stay agent-local. `Think`, `Clock`, and `TodoWrite` are
//! non-removable: skills cannot drop them from the active set.

mod bash;
mod edit;
mod fs_glob;
mod fs_grep;
mod misc;
mod read;
mod scratch;
mod web_fetch;
mod write;

pub use bash::BashTool;
pub use edit::{EditTool, MultiEditTool};
pub(crate) use edit::apply_edit;
pub use fs_glob::GlobTool;
pub use fs_grep::GrepTool;
pub use misc::{ClockTool, ThinkTool, TodoWriteTool};
pub use read::ReadTool;
pub use scratch::{ScratchpadListTool, ScratchpadReadTool, ScratchpadWriteTool};
pub use web_fetch::WebFetchTool;
pub use write::WriteTool;

use std::sync::Arc;

use crate::tool::Tool;

/// Maximum rows returned by the search tools.
pub(crate) const MAX_RESULTS: usize = 50;

/// Fresh instances of the full built-in catalog.
#[must_use]
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadTool),
        Arc::new(WriteTool),
        Arc::new(EditTool),
        Arc::new(MultiEditTool),
        Arc::new(GlobTool),
        Arc::new(GrepTool),
        Arc::new(BashTool),
        Arc::new(WebFetchTool),
        Arc::new(TodoWriteTool::new()),
        Arc::new(ThinkTool),
        Arc::new(ClockTool),
        Arc::new(ScratchpadWriteTool),
        Arc::new(ScratchpadReadTool),
        Arc::new(ScratchpadListTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let tools = default_tools();
        let mut names: Vec<&str> = tools.iter().map(|tool| tool.name()).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn bookkeeping_tools_are_non_removable() {
        for tool in default_tools() {
            let expected = matches!(tool.name(), "Think" | "Clock" | "TodoWrite");
            assert_eq!(!tool.removable(), expected, "tool {}", tool.name());
        }
    }
}
