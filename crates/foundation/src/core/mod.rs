//! Core interfaces and shared data model.
//!
//! - `types`: resource/scheduling data model (`ResourceAccess`, `ToolMetadata`)
//! - `traits`: the `Tool`/`ToolContext`/`ConfirmationPort`/`Configurable` contracts

pub mod traits;
pub mod types;

pub use types::{ResourceAccess, ResourceMode, ResourceType, ToolMetadata};

pub use traits::{
    AutoApprove, Configurable, ConfirmationOutcome, ConfirmationPort, ConfirmationRequest,
    ShellConfig, ShellType, Tool, ToolContext, ToolExecutionResult, ToolMeta, ToolResult,
    ValidationOutcome,
};
