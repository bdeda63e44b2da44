//! Agent loop (C8): sequential `process_user_message` and a streaming
//! variant producing a typed event stream.
//!
//! ## Execution flow (sequential)
//! ```text
//! append user message to both logs
//! loop:
//!     cancelled? -> terminal cancellation entry, return
//!     over budget? -> terminal budget entry, return (Budget error)
//!     call LM with prepare_messages(messages)
//!     record cost
//!     no tool_calls? -> append assistant, return
//!     append assistant (with tool_calls) to both logs
//!     dispatch batch through the orchestrator (C5)
//!     append one tool-role message per call, in submission order
//!     round += 1; round >= max_tool_rounds? -> append synthetic cap notice, return
//! ```

use crate::context::AgentContext;
use crate::context_manager::ContextManager;
use crate::cost::CostTracker;
use crate::history::MessageHistory;
use anvil_core::{ToolCall as CoreToolCall, ToolOrchestrator};
use anvil_foundation::{Error, Result, ToolContext};
use anvil_provider::{Message, StreamEvent as ProviderStreamEvent, ToolCall};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Typed event stream emitted by `Agent::run_stream`, mirroring sequential
/// semantics one chunk/round at a time.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Content { chunk: String },
    ToolCalls { calls: Vec<ToolCall> },
    ToolResult { call: ToolCall, result: String },
    TokenCount { n: u32 },
    Done,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_tool_rounds: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_tool_rounds: 50 }
    }
}

const CANCELLED_CONTENT: &str = "[cancelled]";
const EMPTY_TOOL_CALL_PLACEHOLDER: &str = "Using tools to help you...";
const ROUND_CAP_MESSAGE: &str = "Maximum tool execution rounds reached.";

pub struct Agent {
    ctx: Arc<AgentContext>,
    orchestrator: Arc<ToolOrchestrator>,
    context_manager: ContextManager,
    cost_tracker: Arc<CostTracker>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        ctx: Arc<AgentContext>,
        orchestrator: Arc<ToolOrchestrator>,
        cost_tracker: Arc<CostTracker>,
        config: AgentConfig,
    ) -> Self {
        Self {
            ctx,
            orchestrator,
            context_manager: ContextManager::default(),
            cost_tracker,
            config,
        }
    }

    pub fn with_context_manager(mut self, context_manager: ContextManager) -> Self {
        self.context_manager = context_manager;
        self
    }

    fn budget_guard(&self, chat_history: &mut MessageHistory, messages: &mut Vec<Message>) -> Result<()> {
        let status = self.cost_tracker.budget_status();
        if status.blocked {
            let notice = Message::assistant(format!(
                "Session cost budget exceeded: used ${:.4} of ${:.4}.",
                status.used,
                status.limit.unwrap_or(0.0)
            ));
            chat_history.add(notice.clone());
            messages.push(notice);
            return Err(Error::Budget {
                used: status.used,
                limit: status.limit.unwrap_or(0.0),
            });
        }
        Ok(())
    }

    /// Dispatch one batch of tool calls and append results to both logs in
    /// the original submission order, regardless of completion order.
    async fn dispatch_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        chat_history: &mut MessageHistory,
        messages: &mut Vec<Message>,
        tool_ctx: &dyn ToolContext,
    ) {
        let core_calls: Vec<CoreToolCall> = tool_calls
            .iter()
            .map(|tc| CoreToolCall::new(tc.id.clone(), tc.name.clone(), tc.arguments.clone()))
            .collect();

        let batch = self.orchestrator.execute_batch(core_calls, tool_ctx).await;

        for tc in tool_calls {
            let outcome = batch.per_call_results.iter().find(|o| o.tool_call_id == tc.id);
            let (content, is_error) = match outcome {
                Some(o) if o.result.success => (o.result.output.clone(), false),
                Some(o) => (o.result.error.clone().unwrap_or_else(|| "execution failed".to_string()), true),
                None => ("tool did not run".to_string(), true),
            };
            let tool_msg = Message::tool_result(tc.id.clone(), content, is_error);
            chat_history.add(tool_msg.clone());
            messages.push(tool_msg);
        }
    }

    /// Sequential mode: `processUserMessage(message, chatHistory, messages)`.
    #[instrument(skip(self, chat_history, messages, tool_ctx))]
    pub async fn process_user_message(
        &self,
        model: &str,
        user_message: &str,
        chat_history: &mut MessageHistory,
        messages: &mut Vec<Message>,
        tool_ctx: &dyn ToolContext,
    ) -> Result<()> {
        let user = Message::user(user_message);
        chat_history.add(user.clone());
        messages.push(user);

        let mut round: u32 = 0;

        loop {
            if tool_ctx.is_cancelled() {
                let marker = Message::assistant(CANCELLED_CONTENT);
                chat_history.add(marker.clone());
                messages.push(marker);
                return Err(Error::Cancelled("cancelled before round start".to_string()));
            }

            self.budget_guard(chat_history, messages)?;

            let prepared = self.context_manager.prepare_messages(messages);
            let tool_defs = self.ctx.tool_definitions();

            let response = self
                .ctx
                .gateway
                .complete_with_retry(prepared, tool_defs, Some(self.ctx.system_prompt.clone()))
                .await
                .map_err(|e| {
                    let msg = Message::assistant(format!("Error: {}", e));
                    chat_history.add(msg.clone());
                    messages.push(msg);
                    e
                })?;

            let delta = self.cost_tracker.record_request(
                model,
                response.usage.input_tokens as u64,
                response.usage.output_tokens as u64,
                Some(response.usage.cache_read_tokens as u64),
            );
            info!(round, cost_delta = delta, "recorded LM request cost");

            if response.tool_calls.is_empty() {
                let assistant = Message::assistant(response.content.clone());
                chat_history.add(assistant.clone());
                messages.push(assistant);
                return Ok(());
            }

            let content = if response.content.is_empty() {
                EMPTY_TOOL_CALL_PLACEHOLDER.to_string()
            } else {
                response.content.clone()
            };
            let assistant = Message::assistant_with_tools(content, response.tool_calls.clone());
            chat_history.add(assistant.clone());
            messages.push(assistant);

            self.dispatch_tool_calls(&response.tool_calls, chat_history, messages, tool_ctx)
                .await;

            round += 1;
            if round >= self.config.max_tool_rounds {
                warn!(round, "hit max_tool_rounds cap");
                let notice = Message::assistant(ROUND_CAP_MESSAGE);
                chat_history.add(notice.clone());
                messages.push(notice);
                return Ok(());
            }
        }
    }

    /// Streaming mode: semantics mirror `process_user_message`, one chunk at
    /// a time. Tool calls accumulate across stream chunks and are dispatched
    /// as a batch at end-of-stream.
    #[instrument(skip(self, chat_history, messages, tool_ctx, tx))]
    pub async fn run_stream(
        &self,
        model: &str,
        user_message: &str,
        chat_history: &mut MessageHistory,
        messages: &mut Vec<Message>,
        tool_ctx: &dyn ToolContext,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let user = Message::user(user_message);
        chat_history.add(user.clone());
        messages.push(user);

        let mut round: u32 = 0;

        'rounds: loop {
            if tool_ctx.is_cancelled() {
                let _ = tx.send(AgentEvent::Content { chunk: CANCELLED_CONTENT.to_string() }).await;
                let _ = tx.send(AgentEvent::Done).await;
                let marker = Message::assistant(CANCELLED_CONTENT);
                chat_history.add(marker.clone());
                messages.push(marker);
                return Ok(());
            }

            if let Err(e) = self.budget_guard(chat_history, messages) {
                let _ = tx.send(AgentEvent::Done).await;
                return Err(e);
            }

            let prepared = self.context_manager.prepare_messages(messages);
            let tool_defs = self.ctx.tool_definitions();
            let provider = self.ctx.gateway.default_provider().await?;

            let mut stream = provider.stream(prepared, tool_defs, Some(self.ctx.system_prompt.clone()));
            let mut full_content = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            while let Some(event) = stream.next().await {
                if tool_ctx.is_cancelled() {
                    let _ = tx.send(AgentEvent::Content { chunk: CANCELLED_CONTENT.to_string() }).await;
                    let _ = tx.send(AgentEvent::Done).await;
                    let marker = Message::assistant(CANCELLED_CONTENT);
                    chat_history.add(marker.clone());
                    messages.push(marker);
                    return Ok(());
                }

                match event {
                    ProviderStreamEvent::Text(text) => {
                        full_content.push_str(&text);
                        let _ = tx.send(AgentEvent::Content { chunk: text }).await;
                    }
                    ProviderStreamEvent::ToolCall(call) => {
                        tool_calls.push(call);
                    }
                    ProviderStreamEvent::Usage(usage) => {
                        let delta = self.cost_tracker.record_request(
                            model,
                            usage.input_tokens as u64,
                            usage.output_tokens as u64,
                            Some(usage.cache_read_tokens as u64),
                        );
                        info!(round, cost_delta = delta, "recorded streaming request cost");
                        let _ = tx.send(AgentEvent::TokenCount { n: usage.total() }).await;
                    }
                    ProviderStreamEvent::Error(e) => {
                        let msg = Message::assistant(format!("Error: {}", e));
                        chat_history.add(msg.clone());
                        messages.push(msg);
                        let _ = tx.send(AgentEvent::Done).await;
                        return Err(Error::Provider(e.to_string()));
                    }
                    ProviderStreamEvent::Done => break,
                    ProviderStreamEvent::Thinking(_)
                    | ProviderStreamEvent::ToolCallStart { .. }
                    | ProviderStreamEvent::ToolCallDelta { .. } => {}
                }
            }

            if tool_calls.is_empty() {
                let assistant = Message::assistant(full_content);
                chat_history.add(assistant.clone());
                messages.push(assistant);
                let _ = tx.send(AgentEvent::Done).await;
                return Ok(());
            }

            let content = if full_content.is_empty() {
                EMPTY_TOOL_CALL_PLACEHOLDER.to_string()
            } else {
                full_content
            };
            let assistant = Message::assistant_with_tools(content, tool_calls.clone());
            chat_history.add(assistant.clone());
            messages.push(assistant);
            let _ = tx.send(AgentEvent::ToolCalls { calls: tool_calls.clone() }).await;

            let core_calls: Vec<CoreToolCall> = tool_calls
                .iter()
                .map(|tc| CoreToolCall::new(tc.id.clone(), tc.name.clone(), tc.arguments.clone()))
                .collect();
            let batch = self.orchestrator.execute_batch(core_calls, tool_ctx).await;

            for tc in &tool_calls {
                let outcome = batch.per_call_results.iter().find(|o| o.tool_call_id == tc.id);
                let (content, is_error) = match outcome {
                    Some(o) if o.result.success => (o.result.output.clone(), false),
                    Some(o) => (o.result.error.clone().unwrap_or_else(|| "execution failed".to_string()), true),
                    None => ("tool did not run".to_string(), true),
                };
                let tool_msg = Message::tool_result(tc.id.clone(), content.clone(), is_error);
                chat_history.add(tool_msg.clone());
                messages.push(tool_msg);
                let _ = tx
                    .send(AgentEvent::ToolResult { call: tc.clone(), result: content })
                    .await;

                if tool_ctx.is_cancelled() {
                    let _ = tx.send(AgentEvent::Done).await;
                    continue 'rounds;
                }
            }

            round += 1;
            if round >= self.config.max_tool_rounds {
                let notice = Message::assistant(ROUND_CAP_MESSAGE);
                chat_history.add(notice.clone());
                messages.push(notice);
                let _ = tx.send(AgentEvent::Done).await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::{HookPipeline, ToolRegistry};
    use anvil_foundation::HookFailurePolicy;
    use anvil_provider::{Gateway, Provider};
    use std::time::Duration;

    fn noop_orchestrator() -> Arc<ToolOrchestrator> {
        Arc::new(ToolOrchestrator::new(
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(HookPipeline::new(HookFailurePolicy::Continue, Duration::from_millis(500))),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn default_config_matches_illustrative_value() {
        assert_eq!(AgentConfig::default().max_tool_rounds, 50);
    }

    #[test]
    fn empty_gateway_has_no_default_provider() {
        let gateway = Gateway::new();
        assert!(gateway.list_providers().is_empty());
    }

    // Full round-trip tests (S6/S7 from the end-to-end scenarios) require a
    // mock `Provider` implementation wired through `AgentContext::gateway`;
    // the orchestrator and cost-tracker halves are covered directly in
    // `orchestrator.rs` and `cost.rs`.
    #[allow(dead_code)]
    fn construction_compiles(ctx: Arc<AgentContext>, cost: Arc<CostTracker>) -> Agent {
        Agent::new(ctx, noop_orchestrator(), cost, AgentConfig::default())
    }
}
