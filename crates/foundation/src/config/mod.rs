//! Layered runtime configuration: global (`~/.anvil/config.json`) overridden
//! by project (`.anvil/config.json`), itself overridden by CLI flags.

use crate::core::Configurable;
use serde::{Deserialize, Serialize};

fn default_max_tool_rounds() -> u32 {
    50
}

fn default_hook_timeout_ms() -> u64 {
    5_000
}

fn default_base_cooldown_secs() -> u64 {
    60
}

fn default_billing_cooldown_secs() -> u64 {
    300
}

/// Whether a hook failure aborts the pipeline or is logged and swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookFailurePolicy {
    Continue,
    Abort,
}

impl Default for HookFailurePolicy {
    fn default() -> Self {
        HookFailurePolicy::Continue
    }
}

/// Process-wide configuration for the agentic core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnvilConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    #[serde(default)]
    pub session_cost_limit: Option<f64>,

    #[serde(default)]
    pub hook_failure_policy: HookFailurePolicy,

    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,

    #[serde(default = "default_base_cooldown_secs")]
    pub rotator_base_cooldown_secs: u64,

    #[serde(default = "default_billing_cooldown_secs")]
    pub rotator_billing_cooldown_secs: u64,

    #[serde(default)]
    pub rotator_sticky_sessions: bool,
}

impl Default for AnvilConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            session_cost_limit: None,
            hook_failure_policy: HookFailurePolicy::default(),
            hook_timeout_ms: default_hook_timeout_ms(),
            rotator_base_cooldown_secs: default_base_cooldown_secs(),
            rotator_billing_cooldown_secs: default_billing_cooldown_secs(),
            rotator_sticky_sessions: true,
        }
    }
}

impl Configurable for AnvilConfig {
    const FILE_NAME: &'static str = "config.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_illustrative_values() {
        let config = AnvilConfig::default();
        assert_eq!(config.max_tool_rounds, 50);
        assert!(config.session_cost_limit.is_none());
        assert_eq!(config.hook_failure_policy, HookFailurePolicy::Continue);
    }
}
