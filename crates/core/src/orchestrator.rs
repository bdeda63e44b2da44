//! Tool orchestrator (C5): drives a batch of tool calls wave-by-wave
//! through the dependency scheduler (C3), running every call in a wave
//! concurrently through the hook pipeline (C2) and invoker (C1).

use crate::hook::{HookOutcome, HookPipeline, ToolHookContext};
use crate::tool::{self, ExecutionPlan, ToolCall, ToolRegistry};
use anvil_foundation::{ToolContext, ToolExecutionResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: ToolExecutionResult,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub per_call_results: Vec<CallOutcome>,
    pub waves_executed: usize,
    pub total_duration_ms: u64,
    pub failures: usize,
}

pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    hooks: Arc<HookPipeline>,
    per_call_timeout: Duration,
}

impl ToolOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>, hooks: Arc<HookPipeline>, per_call_timeout: Duration) -> Self {
        Self {
            registry,
            hooks,
            per_call_timeout,
        }
    }

    /// Build the execution plan for `calls` (C3) and run it (C5).
    #[instrument(skip(self, calls, ctx))]
    pub async fn execute_batch(&self, calls: Vec<ToolCall>, ctx: &dyn ToolContext) -> BatchResult {
        let plan = tool::plan(&self.registry, calls);
        self.execute_plan(plan, ctx).await
    }

    #[instrument(skip(self, plan, ctx))]
    pub async fn execute_plan(&self, plan: ExecutionPlan, ctx: &dyn ToolContext) -> BatchResult {
        let started = Instant::now();
        let mut per_call_results = Vec::new();
        let mut waves_executed = 0usize;

        for wave in plan.waves {
            if ctx.is_cancelled() {
                warn!("cancellation observed before wave start; remaining waves not started");
                break;
            }

            info!(wave_size = wave.len(), "dispatching wave");
            let futures = wave.into_iter().map(|call| self.run_one(call, ctx));
            let results = futures::future::join_all(futures).await;
            per_call_results.extend(results);
            waves_executed += 1;
        }

        let failures = per_call_results.iter().filter(|o| !o.result.success).count();
        BatchResult {
            per_call_results,
            waves_executed,
            total_duration_ms: started.elapsed().as_millis() as u64,
            failures,
        }
    }

    async fn run_one(&self, call: ToolCall, ctx: &dyn ToolContext) -> CallOutcome {
        let hook_ctx = ToolHookContext::new(call.name.clone(), call.id.clone(), call.arguments.clone())
            .with_session(ctx.session_id().to_string());

        let hook_ctx = self.hooks.run_before(hook_ctx).await;

        let result = match self.registry.get(&hook_ctx.tool_name) {
            Some(t) => tool::invoke(t.as_ref(), hook_ctx.current_args.clone(), ctx, self.per_call_timeout)
                .await
                .unwrap_or_else(|e| ToolExecutionResult::error(e.to_string(), 0)),
            None => ToolExecutionResult::error(format!("unknown tool: {}", hook_ctx.tool_name), 0),
        };

        if result.error.as_deref() == Some("timed out") {
            self.hooks.notify_timeout(hook_ctx.clone()).await;
        } else if result.error.as_deref() == Some("denied by user") {
            self.hooks.notify_denied(hook_ctx.clone()).await;
        } else if !result.success {
            self.hooks.notify_error(hook_ctx.clone()).await;
        }

        let result = self.hooks.run_after(&hook_ctx, result).await;
        let result = self.hooks.run_persist(&hook_ctx, result);

        CallOutcome {
            tool_call_id: call.id,
            tool_name: call.name,
            result,
        }
    }
}

#[allow(dead_code)]
fn outcome_hint(outcome: HookOutcome) -> &'static str {
    match outcome {
        HookOutcome::Ok => "ok",
        HookOutcome::Error => "error",
        HookOutcome::Timeout => "timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookPipeline;
    use crate::tool::{RuntimeContext, ToolCall};
    use anvil_foundation::HookFailurePolicy;
    use std::path::PathBuf;

    fn orchestrator() -> ToolOrchestrator {
        ToolOrchestrator::new(
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(HookPipeline::new(HookFailurePolicy::Continue, Duration::from_millis(500))),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn parallel_reads_all_land_in_one_wave() {
        let orch = orchestrator();
        let ctx = RuntimeContext::new("s", PathBuf::from("."));
        let calls = vec![
            ToolCall::new("a", "view_file", serde_json::json!({"path": "/does-not-exist-a"})),
            ToolCall::new("b", "view_file", serde_json::json!({"path": "/does-not-exist-b"})),
        ];
        let batch = orch.execute_batch(calls, &ctx).await;
        assert_eq!(batch.waves_executed, 1);
        assert_eq!(batch.per_call_results.len(), 2);
    }

    #[tokio::test]
    async fn read_then_write_same_file_runs_in_two_waves() {
        let orch = orchestrator();
        let ctx = RuntimeContext::new("s", PathBuf::from("."));
        let calls = vec![
            ToolCall::new("a", "view_file", serde_json::json!({"path": "/x"})),
            ToolCall::new(
                "b",
                "str_replace_editor",
                serde_json::json!({"path": "/x", "old_string": "a", "new_string": "b"}),
            ),
        ];
        let batch = orch.execute_batch(calls, &ctx).await;
        assert_eq!(batch.waves_executed, 2);
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_panicking() {
        let orch = orchestrator();
        let ctx = RuntimeContext::new("s", PathBuf::from("."));
        let calls = vec![ToolCall::new("a", "does_not_exist", serde_json::json!({}))];
        let batch = orch.execute_batch(calls, &ctx).await;
        assert_eq!(batch.failures, 1);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_starts_no_new_wave() {
        let orch = orchestrator();
        let ctx = RuntimeContext::new("s", PathBuf::from("."));
        ctx.cancel();
        let calls = vec![ToolCall::new("a", "view_file", serde_json::json!({"path": "/x"}))];
        let batch = orch.execute_batch(calls, &ctx).await;
        assert_eq!(batch.waves_executed, 0);
        assert!(batch.per_call_results.is_empty());
    }
}
