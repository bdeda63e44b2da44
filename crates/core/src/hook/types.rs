//! Types threaded through the hook pipeline: the context every stage sees,
//! and the per-hook metrics the pipeline accumulates.

use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Context passed to `before`/`after` hooks for a single tool invocation.
///
/// `original_args` is fixed at invocation time; `current_args` is what
/// `before` hooks are allowed to mutate as it threads through the chain.
#[derive(Debug, Clone)]
pub struct ToolHookContext {
    pub tool_name: String,
    pub original_args: Value,
    pub current_args: Value,
    pub tool_call_id: String,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub timestamp: u64,
    pub metadata: HashMap<String, Value>,
}

impl ToolHookContext {
    pub fn new(tool_name: impl Into<String>, tool_call_id: impl Into<String>, args: Value) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            tool_name: tool_name.into(),
            original_args: args.clone(),
            current_args: args,
            tool_call_id: tool_call_id.into(),
            session_id: None,
            agent_id: None,
            timestamp,
            metadata: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Rolling metrics kept per registered hook id.
#[derive(Debug, Clone, Default)]
pub struct HookMetrics {
    pub executions: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub avg_duration_ms: f64,
    pub last_duration_ms: u64,
}

impl HookMetrics {
    pub fn record(&mut self, duration_ms: u64, outcome: HookOutcome) {
        self.executions += 1;
        self.last_duration_ms = duration_ms;
        // Incremental mean: avg_n = avg_(n-1) + (x_n - avg_(n-1)) / n
        self.avg_duration_ms += (duration_ms as f64 - self.avg_duration_ms) / self.executions as f64;
        match outcome {
            HookOutcome::Error => self.errors += 1,
            HookOutcome::Timeout => {
                self.errors += 1;
                self.timeouts += 1;
            }
            HookOutcome::Ok => {}
        }
    }
}

/// What happened the last time a hook ran, for metrics bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Ok,
    Error,
    Timeout,
}

/// Which pipeline stage a hook is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    Before,
    After,
    Persist,
    OnError,
    OnTimeout,
    OnDenied,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Persist => "persist",
            Self::OnError => "onError",
            Self::OnTimeout => "onTimeout",
            Self::OnDenied => "onDenied",
        };
        write!(f, "{s}")
    }
}

/// Splits a hook id of the form `plugin:<pid>:<hookId>` into its plugin id,
/// if any.
pub fn plugin_id_of(hook_id: &str) -> Option<&str> {
    let rest = hook_id.strip_prefix("plugin:")?;
    rest.split(':').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_carries_original_and_current_args() {
        let ctx = ToolHookContext::new("bash", "call-1", serde_json::json!({"command": "ls"}));
        assert_eq!(ctx.original_args, ctx.current_args);
        assert_eq!(ctx.tool_name, "bash");
    }

    #[test]
    fn metrics_track_rolling_average() {
        let mut metrics = HookMetrics::default();
        metrics.record(10, HookOutcome::Ok);
        metrics.record(20, HookOutcome::Ok);
        assert_eq!(metrics.executions, 2);
        assert!((metrics.avg_duration_ms - 15.0).abs() < 1e-6);
    }

    #[test]
    fn metrics_count_timeouts_as_errors() {
        let mut metrics = HookMetrics::default();
        metrics.record(5, HookOutcome::Timeout);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.timeouts, 1);
    }

    #[test]
    fn plugin_id_extraction() {
        assert_eq!(plugin_id_of("plugin:git-sync:on-commit"), Some("git-sync"));
        assert_eq!(plugin_id_of("local:audit-log"), None);
    }
}
