//! Core interface contracts implemented by the layers above foundation.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  cli        - ConfirmationPort impl (prompt)  │
//! │  agent      - ToolContext impl, orchestration │
//! │  core       - Tool impl, ToolRegistry         │
//! │  foundation - trait definitions (this file)   │
//! └──────────────────────────────────────────────┘
//! ```

use crate::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Tool
// ============================================================================

/// Descriptive metadata surfaced by a tool for discovery and confirmation UX.
#[derive(Debug, Clone)]
pub struct ToolMeta {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub requires_confirmation: bool,
    pub modifies_files: bool,
    pub makes_network_requests: bool,
}

impl ToolMeta {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            category: "general".to_string(),
            requires_confirmation: false,
            modifies_files: false,
            makes_network_requests: false,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn category(mut self, cat: impl Into<String>) -> Self {
        self.category = cat.into();
        self
    }

    pub fn requires_confirmation(mut self, value: bool) -> Self {
        self.requires_confirmation = value;
        self
    }

    pub fn modifies_files(mut self, value: bool) -> Self {
        self.modifies_files = value;
        self
    }

    pub fn makes_network_requests(mut self, value: bool) -> Self {
        self.makes_network_requests = value;
        self
    }
}

/// Outcome of `Tool::validate`.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of executing a tool. Distinct from the LM-facing `ToolResult`
/// message wrapper in `anvil-provider` — this is the invoker-level record.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub modified: bool,
    pub metadata: HashMap<String, Value>,
}

impl ToolExecutionResult {
    pub fn success(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration_ms,
            modified: false,
            metadata: HashMap::new(),
        }
    }

    pub fn error(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            duration_ms,
            modified: false,
            metadata: HashMap::new(),
        }
    }

    pub fn cancelled(duration_ms: u64) -> Self {
        Self::error("cancelled", duration_ms)
    }

    pub fn denied(duration_ms: u64) -> Self {
        Self::error("denied by user", duration_ms)
    }

    pub fn timed_out(duration_ms: u64) -> Self {
        Self::error("timed out", duration_ms)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

pub type ToolResult = ToolExecutionResult;

/// Uniform tool contract. Implementations live in `anvil-core`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn meta(&self) -> ToolMeta;

    /// JSON schema for the tool's arguments (MCP-compatible shape).
    fn schema(&self) -> Value;

    /// Validate raw arguments before execution. The invoker never calls
    /// `execute` when this reports errors.
    fn validate(&self, args: &Value) -> ValidationOutcome {
        let _ = args;
        ValidationOutcome::ok()
    }

    /// Execute the tool. Implementations must observe `context.is_cancelled()`
    /// and return promptly (`ToolExecutionResult::cancelled`) when it fires.
    async fn execute(&self, args: Value, context: &dyn ToolContext) -> Result<ToolResult>;

    /// Static scheduling metadata used by the dependency scheduler; tools
    /// that need no special handling can rely on the default.
    fn metadata(&self) -> super::types::ToolMetadata {
        super::types::ToolMetadata::new(self.name())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Environment a tool executes within.
#[async_trait]
pub trait ToolContext: Send + Sync {
    fn working_dir(&self) -> &std::path::Path;

    fn session_id(&self) -> &str;

    fn env(&self) -> &HashMap<String, String>;

    /// Ask the confirmation port for permission to proceed. Tools whose
    /// `ToolMeta::requires_confirmation` is false should not call this.
    async fn confirm(&self, request: ConfirmationRequest) -> Result<bool>;

    fn shell_config(&self) -> &dyn ShellConfig;

    fn is_cancelled(&self) -> bool {
        false
    }
}

// ============================================================================
// Shell configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Cmd,
    Nushell,
}

impl ShellType {
    pub fn default_for_os() -> Self {
        #[cfg(target_os = "windows")]
        {
            Self::PowerShell
        }
        #[cfg(target_os = "macos")]
        {
            Self::Zsh
        }
        #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
        {
            Self::Bash
        }
    }

    pub fn executable(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
            ShellType::PowerShell => {
                #[cfg(target_os = "windows")]
                {
                    "powershell.exe"
                }
                #[cfg(not(target_os = "windows"))]
                {
                    "pwsh"
                }
            }
            ShellType::Cmd => "cmd.exe",
            ShellType::Nushell => "nu",
        }
    }

    pub fn exec_args(&self) -> Vec<&'static str> {
        match self {
            ShellType::Bash | ShellType::Zsh | ShellType::Fish | ShellType::Nushell => vec!["-c"],
            ShellType::PowerShell => vec!["-NoProfile", "-Command"],
            ShellType::Cmd => vec!["/C"],
        }
    }
}

impl std::fmt::Display for ShellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellType::Bash => write!(f, "bash"),
            ShellType::Zsh => write!(f, "zsh"),
            ShellType::Fish => write!(f, "fish"),
            ShellType::PowerShell => write!(f, "powershell"),
            ShellType::Cmd => write!(f, "cmd"),
            ShellType::Nushell => write!(f, "nu"),
        }
    }
}

pub trait ShellConfig: Send + Sync {
    fn shell_type(&self) -> ShellType;
    fn executable(&self) -> &str;
    fn exec_args(&self) -> Vec<String>;
    fn env_vars(&self) -> HashMap<String, String>;
    fn timeout_secs(&self) -> u64;
    fn working_dir(&self) -> Option<&std::path::Path>;
}

// ============================================================================
// Configurable - JSON-backed config load/save
// ============================================================================

pub trait Configurable: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    fn load_global() -> Result<Self> {
        let store = crate::storage::JsonStore::global()?;
        Ok(store.load_or_default(Self::FILE_NAME))
    }

    fn load_project() -> Result<Self> {
        let store = crate::storage::JsonStore::current_project()?;
        Ok(store.load_or_default(Self::FILE_NAME))
    }

    /// Global config overridden by project config, when present.
    fn load() -> Result<Self>
    where
        Self: Sized + Clone,
    {
        let global = Self::load_global().unwrap_or_default();
        if let Ok(project) = Self::load_project() {
            Ok(project)
        } else {
            Ok(global)
        }
    }

    fn save_global(&self) -> Result<()> {
        let store = crate::storage::JsonStore::global()?;
        store.save(Self::FILE_NAME, self)
    }

    fn save_project(&self) -> Result<()> {
        let store = crate::storage::JsonStore::current_project()?;
        store.save(Self::FILE_NAME, self)
    }
}

// ============================================================================
// Confirmation port
// ============================================================================

/// What a tool is asking the user to approve.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub operation: String,
    pub target: String,
    pub preview: Option<String>,
}

impl ConfirmationRequest {
    pub fn new(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            preview: None,
        }
    }

    pub fn preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationOutcome {
    pub confirmed: bool,
    pub feedback: Option<String>,
}

/// UI-facing confirmation collaborator. Implemented by `anvil-cli`.
/// A session may set "approve all of kind K" which should short-circuit
/// further prompts for operations of that kind; that bookkeeping belongs
/// to the implementation, not this trait.
#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    async fn confirm(&self, request: ConfirmationRequest) -> ConfirmationOutcome;
}

/// A confirmation port that always approves, for headless/non-interactive runs.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPort for AutoApprove {
    async fn confirm(&self, _request: ConfirmationRequest) -> ConfirmationOutcome {
        ConfirmationOutcome {
            confirmed: true,
            feedback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_type_default() {
        let shell = ShellType::default_for_os();
        #[cfg(target_os = "windows")]
        assert_eq!(shell, ShellType::PowerShell);
        #[cfg(target_os = "macos")]
        assert_eq!(shell, ShellType::Zsh);
    }

    #[test]
    fn test_tool_meta_builder() {
        let meta = ToolMeta::new("bash")
            .display_name("Bash Shell")
            .description("Execute shell commands")
            .category("execute");

        assert_eq!(meta.name, "bash");
        assert_eq!(meta.display_name, "Bash Shell");
        assert_eq!(meta.category, "execute");
    }

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::success("done", 12);
        assert!(ok.success);
        assert_eq!(ok.duration_ms, 12);

        let cancelled = ToolResult::cancelled(3);
        assert_eq!(cancelled.error.as_deref(), Some("cancelled"));

        let denied = ToolResult::denied(1);
        assert_eq!(denied.error.as_deref(), Some("denied by user"));
    }

    #[tokio::test]
    async fn auto_approve_always_confirms() {
        let port = AutoApprove;
        let outcome = port
            .confirm(ConfirmationRequest::new("delete", "/tmp/x"))
            .await;
        assert!(outcome.confirmed);
    }
}
