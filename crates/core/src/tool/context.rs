//! Tool execution context.
//!
//! Implements `ToolContext` from the foundation crate, wiring a
//! `ConfirmationPort` in for interactive approval and a shared
//! cancellation flag that tool implementations poll between steps.

use async_trait::async_trait;
use anvil_foundation::{
    AutoApprove, ConfirmationPort, ConfirmationRequest, Result, ShellConfig, ShellType,
    ToolContext,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// DefaultShellConfig
// ============================================================================

pub struct DefaultShellConfig {
    shell_type: ShellType,
    executable: String,
    timeout_secs: u64,
    env_vars: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl DefaultShellConfig {
    pub fn new() -> Self {
        let shell_type = ShellType::default_for_os();
        Self {
            executable: shell_type.executable().to_string(),
            shell_type,
            timeout_secs: 120,
            env_vars: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_shell_type(mut self, shell_type: ShellType) -> Self {
        self.shell_type = shell_type;
        self.executable = shell_type.executable().to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }
}

impl Default for DefaultShellConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellConfig for DefaultShellConfig {
    fn shell_type(&self) -> ShellType {
        self.shell_type
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    fn exec_args(&self) -> Vec<String> {
        self.shell_type.exec_args().iter().map(|s| s.to_string()).collect()
    }

    fn env_vars(&self) -> HashMap<String, String> {
        self.env_vars.clone()
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

// ============================================================================
// RuntimeContext
// ============================================================================

/// The environment a tool runs in: working directory, session id, env
/// vars, a shared cancellation flag, and a confirmation port for the
/// operations its `ToolMeta::requires_confirmation` flags.
pub struct RuntimeContext {
    session_id: String,
    working_dir: PathBuf,
    env: HashMap<String, String>,
    confirmation_port: Arc<dyn ConfirmationPort>,
    cancelled: Arc<AtomicBool>,
    shell_config: Box<dyn ShellConfig>,
}

impl RuntimeContext {
    pub fn new(session_id: impl Into<String>, working_dir: PathBuf) -> Self {
        Self {
            session_id: session_id.into(),
            working_dir: working_dir.clone(),
            env: std::env::vars().collect(),
            confirmation_port: Arc::new(AutoApprove),
            cancelled: Arc::new(AtomicBool::new(false)),
            shell_config: Box::new(DefaultShellConfig::new().with_working_dir(working_dir)),
        }
    }

    pub fn with_shell_config(mut self, config: impl ShellConfig + 'static) -> Self {
        self.shell_config = Box::new(config);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_confirmation_port(mut self, port: Arc<dyn ConfirmationPort>) -> Self {
        self.confirmation_port = port;
        self
    }

    /// A clone of the shared flag, for whoever drives cancellation
    /// (the agent loop's cancellation harness).
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolContext for RuntimeContext {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    async fn confirm(&self, request: ConfirmationRequest) -> Result<bool> {
        let outcome = self.confirmation_port.confirm(request).await;
        Ok(outcome.confirmed)
    }

    fn shell_config(&self) -> &dyn ShellConfig {
        self.shell_config.as_ref()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_config() {
        let config = DefaultShellConfig::new();

        #[cfg(target_os = "windows")]
        assert_eq!(config.shell_type(), ShellType::PowerShell);

        #[cfg(target_os = "macos")]
        assert_eq!(config.shell_type(), ShellType::Zsh);

        assert_eq!(config.timeout_secs(), 120);
    }

    #[test]
    fn test_shell_config_builder() {
        let config = DefaultShellConfig::new()
            .with_shell_type(ShellType::Bash)
            .with_timeout(60)
            .with_env("MY_VAR", "value");

        assert_eq!(config.shell_type(), ShellType::Bash);
        assert_eq!(config.timeout_secs(), 60);
        assert_eq!(config.env_vars().get("MY_VAR"), Some(&"value".to_string()));
    }

    #[tokio::test]
    async fn test_runtime_context() {
        let ctx = RuntimeContext::new("test-session", PathBuf::from("/tmp"));

        assert_eq!(ctx.session_id(), "test-session");
        assert_eq!(ctx.working_dir(), Path::new("/tmp"));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_flag_is_observed() {
        let ctx = RuntimeContext::new("s", PathBuf::from("/tmp"));
        let flag = ctx.cancellation_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn auto_approve_confirms_by_default() {
        let ctx = RuntimeContext::new("s", PathBuf::from("/tmp"));
        let confirmed = ctx
            .confirm(ConfirmationRequest::new("delete", "/tmp/x"))
            .await
            .unwrap();
        assert!(confirmed);
    }
}
