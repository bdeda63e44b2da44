//! # anvil-core
//!
//! The execution core built on top of `anvil-foundation`:
//!
//! - `tool`: the builtin tool catalogue, the runtime `ToolContext`, the
//!   registry and invoker (C1), and the dependency scheduler (C3)
//! - `hook`: the tool-call hook pipeline (C2)
//! - `orchestrator`: wires C1/C2/C3 together wave-by-wave (C5)

pub mod hook;
pub mod orchestrator;
pub mod tool;

pub use hook::{
    plugin_id_of, AfterHook, BeforeHook, HookMetrics, HookOutcome, HookPipeline, HookStage,
    NotifyHook, PersistHook, ToolHookContext,
};

pub use orchestrator::{BatchResult, CallOutcome, ToolOrchestrator};

pub use tool::{
    all_tools, can_run_in_parallel, core_tools, invoke, BashTool, DefaultShellConfig, EditTool,
    ExecutionPlan, ReadTool, RuntimeContext, Tool, ToolCall, ToolContext, ToolRegistry,
    WebSearchTool,
};

pub use anvil_foundation::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn tool_registry_has_builtins() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.contains("view_file"));
        assert!(registry.contains("str_replace_editor"));
        assert!(registry.contains("bash"));
        assert!(registry.contains("web_search"));
    }
}
