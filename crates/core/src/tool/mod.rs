//! The tool system: the `Tool`/`ToolContext` contract from `anvil-foundation`,
//! the builtin tool catalogue, the runtime context that backs them, the
//! registry that looks tools up by name, and the dependency scheduler (C3)
//! that turns a batch of calls into parallel execution waves.

pub mod builtin;
mod context;
mod invoker;
mod parallel;
mod registry;

pub use anvil_foundation::{Tool, ToolContext};

pub use builtin::{all_tools, core_tools, BashTool, EditTool, ReadTool, WebSearchTool};

pub use context::{DefaultShellConfig, RuntimeContext};

pub use invoker::invoke;

pub use parallel::{can_run_in_parallel, plan, ExecutionPlan, ToolCall};

pub use registry::ToolRegistry;
