//! # anvil-agent
//!
//! Agent loop, branch store, context management, and cost accounting for
//! anvil - the Claude Code / OpenCode style single-thread agent loop, with
//! sequential tool execution delegated to the orchestrator in `anvil-core`.
//!
//! ## Core components
//!
//! - **Agent**: the main agent loop (sequential and streaming)
//! - **BranchStore**: git-like checkpoint/branch/merge over conversation state
//! - **ContextManager**: token-budget tracking and compaction warnings
//! - **CostTracker**: per-model pricing and session budget accounting
//! - **SessionManager**: session lifecycle, persisted alongside branch data
//!
//! ## Usage
//!
//! ```ignore
//! use anvil_agent::{Agent, AgentConfig};
//!
//! let agent = Agent::new(ctx, orchestrator, cost_tracker, AgentConfig::default());
//! agent.process_user_message(model, "Hello", &mut history, &mut messages, &tool_ctx).await?;
//! ```

pub mod agent;
pub mod branch;
pub mod context;
pub mod context_manager;
pub mod cost;
pub mod history;
pub mod session;

pub use agent::{Agent, AgentConfig, AgentEvent};
pub use branch::{Branch, BranchStore, MergeStrategy, MAIN_BRANCH_ID};
pub use context::{AgentContext, ProviderInfo};
pub use context_manager::{ContextManager, ContextManagerConfig, ContextWarning};
pub use cost::{default_pricing_table, BudgetStatus, CostTracker, ModelPricing};
pub use history::MessageHistory;
pub use session::{Session, SessionManager};

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::agent::{Agent, AgentConfig, AgentEvent};
    pub use crate::context::AgentContext;
    pub use crate::context_manager::ContextManager;
    pub use crate::cost::CostTracker;
    pub use crate::history::MessageHistory;
    pub use crate::session::SessionManager;
}
