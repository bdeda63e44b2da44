//! Non-interactive CLI mode: run a single prompt to completion and exit.

use anvil_agent::{Agent, AgentConfig, AgentContext};
use anvil_agent::history::MessageHistory;
use anvil_core::ToolRegistry;
use anvil_foundation::{AutoApprove, ProviderConfig, Result};
use anvil_provider::Gateway;
use anvil_provider::Message;
use std::sync::Arc;

pub struct RunOptions {
    pub max_tool_rounds: u32,
    pub session_cost_limit: Option<f64>,
    pub session_id: String,
}

/// Run a single prompt in non-interactive mode. Returns the session's final
/// cost used, so the caller can report it after the process exits.
pub async fn run_once(config: &ProviderConfig, prompt: &str, opts: RunOptions) -> Result<f64> {
    let gateway = Arc::new(Gateway::from_config(config)?);
    let tools = Arc::new(ToolRegistry::with_builtins());
    let working_dir = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));

    let ctx = Arc::new(AgentContext::new(gateway, tools, Arc::new(AutoApprove), working_dir));
    let cost_tracker = Arc::new(anvil_agent::CostTracker::new(
        anvil_agent::default_pricing_table(),
        opts.session_cost_limit,
    ));

    let runtime_ctx = ctx.tool_context(&opts.session_id);
    let cancel_flag = runtime_ctx.cancellation_flag();

    let hooks = Arc::new(anvil_core::HookPipeline::new(
        anvil_foundation::HookFailurePolicy::Continue,
        std::time::Duration::from_millis(5000),
    ));
    let orchestrator = Arc::new(anvil_core::ToolOrchestrator::new(
        ctx.tools.clone(),
        hooks,
        std::time::Duration::from_secs(120),
    ));

    let agent = Agent::new(
        ctx.clone(),
        orchestrator,
        cost_tracker.clone(),
        AgentConfig {
            max_tool_rounds: opts.max_tool_rounds,
        },
    );

    let mut chat_history = MessageHistory::with_system_prompt(ctx.system_prompt.clone());
    let mut messages = vec![Message::system(ctx.system_prompt.clone())];

    let model = ctx.current_model().await.unwrap_or_else(|| "unknown".to_string());

    let run = agent.process_user_message(&model, prompt, &mut chat_history, &mut messages, &runtime_ctx);

    tokio::select! {
        result = run => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            cancel_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            return Err(anvil_foundation::Error::Cancelled("interrupted by user".to_string()));
        }
    }

    for message in &messages {
        if message.role == anvil_provider::MessageRole::Assistant {
            println!("{}", message.content);
        }
    }

    Ok(cost_tracker.budget_status().used)
}
