//! The hook pipeline (C2): ordered, priority-ranked middleware around every
//! tool invocation.
//!
//! Six stages. `before`/`after` may rewrite ctx/result; `persist` is
//! synchronous and must never block; `onError`/`onTimeout`/`onDenied` are
//! fire-and-forget notifications whose return value is discarded.

use super::types::{HookMetrics, HookOutcome, HookStage, ToolHookContext};
use anvil_foundation::{HookFailurePolicy, ToolResult};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub type BeforeHook =
    Arc<dyn Fn(ToolHookContext) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ToolHookContext>>> + Send>> + Send + Sync>;
pub type AfterHook = Arc<
    dyn Fn(ToolHookContext, ToolResult) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ToolResult>>> + Send>>
        + Send
        + Sync,
>;
pub type PersistHook = Arc<dyn Fn(&ToolHookContext, &ToolResult) -> ToolResult + Send + Sync>;
pub type NotifyHook =
    Arc<dyn Fn(ToolHookContext) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Entry<H> {
    id: String,
    priority: i32,
    seq: u64,
    hook: H,
}

/// Ordered, metrics-tracked middleware around tool invocation.
pub struct HookPipeline {
    before: Vec<Entry<BeforeHook>>,
    after: Vec<Entry<AfterHook>>,
    persist: Vec<Entry<PersistHook>>,
    on_error: Vec<Entry<NotifyHook>>,
    on_timeout: Vec<Entry<NotifyHook>>,
    on_denied: Vec<Entry<NotifyHook>>,
    seq_counter: u64,
    failure_policy: HookFailurePolicy,
    hook_timeout: Duration,
    metrics: Mutex<HashMap<String, HookMetrics>>,
}

impl HookPipeline {
    pub fn new(failure_policy: HookFailurePolicy, hook_timeout: Duration) -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            persist: Vec::new(),
            on_error: Vec::new(),
            on_timeout: Vec::new(),
            on_denied: Vec::new(),
            seq_counter: 0,
            failure_policy,
            hook_timeout,
            metrics: Mutex::new(HashMap::new()),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq_counter += 1;
        self.seq_counter
    }

    pub fn register_before(&mut self, id: impl Into<String>, priority: i32, hook: BeforeHook) {
        let seq = self.next_seq();
        self.before.push(Entry { id: id.into(), priority, seq, hook });
    }

    pub fn register_after(&mut self, id: impl Into<String>, priority: i32, hook: AfterHook) {
        let seq = self.next_seq();
        self.after.push(Entry { id: id.into(), priority, seq, hook });
    }

    pub fn register_persist(&mut self, id: impl Into<String>, priority: i32, hook: PersistHook) {
        let seq = self.next_seq();
        self.persist.push(Entry { id: id.into(), priority, seq, hook });
    }

    pub fn register_on_error(&mut self, id: impl Into<String>, priority: i32, hook: NotifyHook) {
        let seq = self.next_seq();
        self.on_error.push(Entry { id: id.into(), priority, seq, hook });
    }

    pub fn register_on_timeout(&mut self, id: impl Into<String>, priority: i32, hook: NotifyHook) {
        let seq = self.next_seq();
        self.on_timeout.push(Entry { id: id.into(), priority, seq, hook });
    }

    pub fn register_on_denied(&mut self, id: impl Into<String>, priority: i32, hook: NotifyHook) {
        let seq = self.next_seq();
        self.on_denied.push(Entry { id: id.into(), priority, seq, hook });
    }

    /// Removes a single hook by id from every stage registry.
    pub fn unregister(&mut self, id: &str) {
        self.before.retain(|e| e.id != id);
        self.after.retain(|e| e.id != id);
        self.persist.retain(|e| e.id != id);
        self.on_error.retain(|e| e.id != id);
        self.on_timeout.retain(|e| e.id != id);
        self.on_denied.retain(|e| e.id != id);
    }

    /// Removes every hook scoped to `plugin:<plugin_id>:*`.
    pub fn unregister_by_plugin(&mut self, plugin_id: &str) {
        let prefix = format!("plugin:{plugin_id}:");
        self.before.retain(|e| !e.id.starts_with(&prefix));
        self.after.retain(|e| !e.id.starts_with(&prefix));
        self.persist.retain(|e| !e.id.starts_with(&prefix));
        self.on_error.retain(|e| !e.id.starts_with(&prefix));
        self.on_timeout.retain(|e| !e.id.starts_with(&prefix));
        self.on_denied.retain(|e| !e.id.starts_with(&prefix));
    }

    pub async fn metrics_for(&self, id: &str) -> Option<HookMetrics> {
        self.metrics.lock().await.get(id).cloned()
    }

    async fn record(&self, id: &str, duration_ms: u64, outcome: HookOutcome) {
        let mut metrics = self.metrics.lock().await;
        metrics.entry(id.to_string()).or_default().record(duration_ms, outcome);
    }

    fn ordered<'a, H>(entries: &'a [Entry<H>]) -> Vec<&'a Entry<H>> {
        let mut v: Vec<&Entry<H>> = entries.iter().collect();
        v.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        v
    }

    /// Threads `ctx` through every `before` hook in priority order.
    pub async fn run_before(&self, mut ctx: ToolHookContext) -> ToolHookContext {
        for entry in Self::ordered(&self.before) {
            let started = Instant::now();
            let result = tokio::time::timeout(self.hook_timeout, (entry.hook)(ctx.clone())).await;
            let elapsed = started.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(Some(next))) => {
                    self.record(&entry.id, elapsed, HookOutcome::Ok).await;
                    ctx = next;
                }
                Ok(Ok(None)) => {
                    self.record(&entry.id, elapsed, HookOutcome::Ok).await;
                }
                Ok(Err(e)) => {
                    self.record(&entry.id, elapsed, HookOutcome::Error).await;
                    error!(hook = %entry.id, error = %e, "before hook failed");
                    self.notify_error(ctx.clone()).await;
                    if matches!(self.failure_policy, HookFailurePolicy::Abort) {
                        break;
                    }
                }
                Err(_) => {
                    self.record(&entry.id, elapsed, HookOutcome::Timeout).await;
                    warn!(hook = %entry.id, "before hook timed out");
                    self.notify_timeout(ctx.clone()).await;
                    if matches!(self.failure_policy, HookFailurePolicy::Abort) {
                        break;
                    }
                }
            }
        }
        ctx
    }

    /// Threads `result` through every `after` hook; sets `modified=true` if
    /// any hook changed it.
    pub async fn run_after(&self, ctx: &ToolHookContext, mut result: ToolResult) -> ToolResult {
        for entry in Self::ordered(&self.after) {
            let started = Instant::now();
            let fut = (entry.hook)(ctx.clone(), result.clone());
            let outcome = tokio::time::timeout(self.hook_timeout, fut).await;
            let elapsed = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(Some(next))) => {
                    self.record(&entry.id, elapsed, HookOutcome::Ok).await;
                    result = next;
                    result.modified = true;
                }
                Ok(Ok(None)) => {
                    self.record(&entry.id, elapsed, HookOutcome::Ok).await;
                }
                Ok(Err(e)) => {
                    self.record(&entry.id, elapsed, HookOutcome::Error).await;
                    error!(hook = %entry.id, error = %e, "after hook failed");
                    self.notify_error(ctx.clone()).await;
                    if matches!(self.failure_policy, HookFailurePolicy::Abort) {
                        break;
                    }
                }
                Err(_) => {
                    self.record(&entry.id, elapsed, HookOutcome::Timeout).await;
                    warn!(hook = %entry.id, "after hook timed out");
                    self.notify_timeout(ctx.clone()).await;
                    if matches!(self.failure_policy, HookFailurePolicy::Abort) {
                        break;
                    }
                }
            }
        }
        result
    }

    /// Synchronous pass immediately before a result is written to any
    /// transcript. Must never block — hooks here are plain functions.
    pub fn run_persist(&self, ctx: &ToolHookContext, result: ToolResult) -> ToolResult {
        let mut result = result;
        for entry in Self::ordered(&self.persist) {
            result = (entry.hook)(ctx, &result);
        }
        result
    }

    pub async fn notify_error(&self, ctx: ToolHookContext) {
        for entry in Self::ordered(&self.on_error) {
            debug!(hook = %entry.id, "running onError notification");
            (entry.hook)(ctx.clone()).await;
        }
    }

    pub async fn notify_timeout(&self, ctx: ToolHookContext) {
        for entry in Self::ordered(&self.on_timeout) {
            debug!(hook = %entry.id, "running onTimeout notification");
            (entry.hook)(ctx.clone()).await;
        }
    }

    pub async fn notify_denied(&self, ctx: ToolHookContext) {
        for entry in Self::ordered(&self.on_denied) {
            debug!(hook = %entry.id, "running onDenied notification");
            (entry.hook)(ctx.clone()).await;
        }
    }
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self::new(HookFailurePolicy::default(), Duration::from_millis(5_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> ToolHookContext {
        ToolHookContext::new("bash", "call-1", json!({"command": "ls"}))
    }

    #[tokio::test]
    async fn before_hooks_run_in_priority_order() {
        let mut pipeline = HookPipeline::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        pipeline.register_before(
            "low",
            0,
            Arc::new(move |ctx| {
                let o = o1.clone();
                Box::pin(async move {
                    o.lock().await.push("low");
                    Ok(Some(ctx))
                })
            }),
        );
        let o2 = order.clone();
        pipeline.register_before(
            "high",
            10,
            Arc::new(move |ctx| {
                let o = o2.clone();
                Box::pin(async move {
                    o.lock().await.push("high");
                    Ok(Some(ctx))
                })
            }),
        );

        pipeline.run_before(ctx()).await;
        assert_eq!(*order.lock().await, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn ties_broken_by_insertion_order() {
        let mut pipeline = HookPipeline::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let o = order.clone();
            pipeline.register_before(
                name,
                5,
                Arc::new(move |ctx| {
                    let o = o.clone();
                    let name = name.to_string();
                    Box::pin(async move {
                        o.lock().await.push(name);
                        Ok(Some(ctx))
                    })
                }),
            );
        }

        pipeline.run_before(ctx()).await;
        assert_eq!(*order.lock().await, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn before_hook_error_continues_by_default() {
        let mut pipeline = HookPipeline::default();
        let ran = Arc::new(AtomicUsize::new(0));

        pipeline.register_before(
            "failing",
            10,
            Arc::new(|_ctx| Box::pin(async move { Err(anyhow::anyhow!("boom")) })),
        );
        let r = ran.clone();
        pipeline.register_before(
            "after-failure",
            0,
            Arc::new(move |ctx| {
                let r = r.clone();
                Box::pin(async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(ctx))
                })
            }),
        );

        pipeline.run_before(ctx()).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.metrics_for("failing").await.unwrap().errors, 1);
    }

    #[tokio::test]
    async fn after_hook_sets_modified_flag() {
        let mut pipeline = HookPipeline::default();
        pipeline.register_after(
            "rewriter",
            0,
            Arc::new(|_ctx, mut result| {
                Box::pin(async move {
                    result.output = "rewritten".to_string();
                    Ok(Some(result))
                })
            }),
        );

        let result = ToolResult::success("original", 1);
        let result = pipeline.run_after(&ctx(), result).await;
        assert!(result.modified);
        assert_eq!(result.output, "rewritten");
    }

    #[test]
    fn persist_hooks_run_synchronously() {
        let mut pipeline = HookPipeline::default();
        pipeline.register_persist(
            "redactor",
            0,
            Arc::new(|_ctx, result| {
                let mut r = result.clone();
                r.output = "[redacted]".to_string();
                r
            }),
        );

        let result = pipeline.run_persist(&ctx(), ToolResult::success("secret", 1));
        assert_eq!(result.output, "[redacted]");
    }

    #[tokio::test]
    async fn unregister_by_plugin_drops_scoped_hooks() {
        let mut pipeline = HookPipeline::default();
        pipeline.register_before(
            "plugin:audit:before",
            0,
            Arc::new(|ctx| Box::pin(async move { Ok(Some(ctx)) })),
        );
        pipeline.register_before("local:before", 0, Arc::new(|ctx| Box::pin(async move { Ok(Some(ctx)) })));

        pipeline.unregister_by_plugin("audit");
        assert_eq!(pipeline.before.len(), 1);
        assert_eq!(pipeline.before[0].id, "local:before");
    }
}
