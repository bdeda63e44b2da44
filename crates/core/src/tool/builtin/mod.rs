//! Builtin tools.
//!
//! A representative sample, not an exhaustive catalogue: `view_file` (read),
//! `str_replace_editor` (edit), `bash` (shell execution), and `web_search`.

pub mod bash;
pub mod edit;
pub mod read;
pub mod web_search;

pub use bash::BashTool;
pub use edit::EditTool;
pub use read::ReadTool;
pub use web_search::WebSearchTool;

use anvil_foundation::Tool;
use std::sync::Arc;

/// All builtin tools.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadTool::new()) as Arc<dyn Tool>,
        Arc::new(EditTool::new()),
        Arc::new(BashTool::new()),
        Arc::new(WebSearchTool::new()),
    ]
}

/// The minimal set needed to get a session going: read, edit, bash.
pub fn core_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadTool::new()) as Arc<dyn Tool>,
        Arc::new(EditTool::new()),
        Arc::new(BashTool::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools() {
        let tools = all_tools();
        assert_eq!(tools.len(), 4);

        let names: Vec<_> = tools.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"view_file"));
        assert!(names.contains(&"str_replace_editor"));
        assert!(names.contains(&"bash"));
        assert!(names.contains(&"web_search"));
    }

    #[test]
    fn test_all_tools_have_schemas() {
        for tool in all_tools() {
            let schema = tool.schema();
            assert!(schema.get("type").is_some(), "{} missing schema type", tool.name());
            assert!(
                schema.get("properties").is_some(),
                "{} missing schema properties",
                tool.name()
            );
        }
    }

    #[test]
    fn test_all_tools_have_meta() {
        for tool in all_tools() {
            let meta = tool.meta();
            assert!(!meta.name.is_empty());
            assert!(!meta.category.is_empty());
        }
    }
}
