//! The tool-call hook pipeline (C2): ordered middleware around every tool
//! invocation, with priority-ranked `before`/`after` stages, a synchronous
//! `persist` pass, and `onError`/`onTimeout`/`onDenied` notifications.

mod executor;
mod types;

pub use executor::{AfterHook, BeforeHook, HookPipeline, NotifyHook, PersistHook};
pub use types::{plugin_id_of, HookMetrics, HookOutcome, HookStage, ToolHookContext};
