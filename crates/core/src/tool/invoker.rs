//! Tool invoker (C1): the single call path every tool execution goes
//! through — validate, honour cancellation, execute, hard-timeout.

use anvil_foundation::{Result, Tool, ToolContext, ToolExecutionResult};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// `invoke(toolCall) → ToolResult`: validates first; on validation failure,
/// returns a failure result without calling `execute`. Honours cancellation
/// both before starting and via the tool's own polling of `ctx.is_cancelled()`
/// during `execute`. Bounded by `timeout`.
pub async fn invoke(
    tool: &dyn Tool,
    args: Value,
    ctx: &dyn ToolContext,
    timeout: Duration,
) -> Result<ToolExecutionResult> {
    let started = Instant::now();

    if ctx.is_cancelled() {
        return Ok(ToolExecutionResult::cancelled(started.elapsed().as_millis() as u64));
    }

    let outcome = tool.validate(&args);
    if !outcome.is_ok() {
        debug!(tool = tool.name(), errors = ?outcome.errors, "validation failed, skipping execute");
        return Ok(ToolExecutionResult::error(
            outcome.errors.join("; "),
            started.elapsed().as_millis() as u64,
        ));
    }

    match tokio::time::timeout(timeout, tool.execute(args, ctx)).await {
        Ok(result) => {
            let mut result = result?;
            if result.duration_ms == 0 {
                result.duration_ms = started.elapsed().as_millis() as u64;
            }
            Ok(result)
        }
        Err(_) => Ok(ToolExecutionResult::timed_out(started.elapsed().as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::context::RuntimeContext;
    use crate::tool::registry::ToolRegistry;
    use std::path::PathBuf;

    fn ctx() -> RuntimeContext {
        RuntimeContext::new("s", PathBuf::from("."))
    }

    #[tokio::test]
    async fn validation_failure_never_calls_execute() {
        let registry = ToolRegistry::with_builtins();
        let tool = registry.get("str_replace_editor").unwrap();
        let context = ctx();
        let result = invoke(tool.as_ref(), serde_json::json!({}), &context, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn cancelled_before_start_short_circuits() {
        let registry = ToolRegistry::with_builtins();
        let tool = registry.get("view_file").unwrap();
        let context = ctx();
        context.cancel();
        let result = invoke(
            tool.as_ref(),
            serde_json::json!({"path": "/nonexistent"}),
            &context,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn duration_ms_is_always_set() {
        let registry = ToolRegistry::with_builtins();
        let tool = registry.get("view_file").unwrap();
        let context = ctx();
        let result = invoke(
            tool.as_ref(),
            serde_json::json!({"path": "/nonexistent-file-xyz"}),
            &context,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        // duration_ms is a u64 and always populated; no assertion beyond "it ran".
        let _ = result.duration_ms;
    }
}
