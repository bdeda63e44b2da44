//! `bash`: execute a shell command in the session's working directory.
//!
//! Risk analysis is left to the confirmation port (every invocation asks);
//! what this tool owns is process lifecycle, timeout, output capture, and
//! Windows/PowerShell command translation.

use async_trait::async_trait;
use anvil_foundation::{
    ConfirmationRequest, Error, Result, ResourceAccess, ResourceMode, ResourceType, ShellConfig,
    ShellType, Tool, ToolContext, ToolMeta, ToolMetadata, ToolResult, ValidationOutcome,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
pub struct BashInput {
    pub command: String,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct BashTool;

impl BashTool {
    pub fn new() -> Self {
        Self
    }

    pub const NAME: &'static str = "bash";
    const DEFAULT_TIMEOUT_MS: u64 = 120_000;
    const MAX_TIMEOUT_MS: u64 = 600_000;
    const MAX_OUTPUT_SIZE: usize = 30_000;
    const CANCEL_POLL_MS: u64 = 50;

    /// Translates common Unix invocations to PowerShell equivalents; a
    /// no-op on every other shell.
    fn normalize_command(command: &str, shell_config: &dyn ShellConfig) -> String {
        if !matches!(shell_config.shell_type(), ShellType::PowerShell) {
            return command.to_string();
        }

        let mut cmd = command.replace(" && ", " ; ");

        const REPLACEMENTS: &[(&str, &str)] = &[
            ("cat ", "Get-Content "),
            ("ls ", "Get-ChildItem "),
            ("rm -rf ", "Remove-Item -Recurse -Force "),
            ("rm -r ", "Remove-Item -Recurse "),
            ("rm ", "Remove-Item "),
            ("cp ", "Copy-Item "),
            ("mv ", "Move-Item "),
            ("mkdir -p ", "New-Item -ItemType Directory -Force -Path "),
            ("mkdir ", "New-Item -ItemType Directory -Path "),
            ("touch ", "New-Item -ItemType File -Path "),
            ("grep ", "Select-String -Pattern "),
            ("head -n ", "Select-Object -First "),
            ("tail -n ", "Select-Object -Last "),
            ("pwd", "(Get-Location).Path"),
            ("echo ", "Write-Output "),
            ("which ", "Get-Command "),
        ];

        for (unix, ps) in REPLACEMENTS {
            if cmd.starts_with(unix) {
                cmd = format!("{ps}{}", &cmd[unix.len()..]);
            }
            cmd = cmd.replace(&format!("; {unix}"), &format!("; {ps}"));
        }

        cmd
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .display_name("Bash")
            .description("Execute a shell command in the working directory")
            .category("execute")
            .requires_confirmation(true)
            .modifies_files(true)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Optional timeout in milliseconds (max 600000)"
                },
                "description": {
                    "type": "string",
                    "description": "Clear, concise description of what this command does"
                }
            },
            "required": ["command"]
        })
    }

    fn validate(&self, args: &Value) -> ValidationOutcome {
        match args.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => ValidationOutcome::ok(),
            _ => ValidationOutcome::error("command cannot be empty"),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(self.name()).side_effects(true)
    }

    async fn execute(&self, args: Value, context: &dyn ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let parsed: BashInput =
            serde_json::from_value(args).map_err(|e| Error::Validation(e.to_string()))?;
        let elapsed = || started.elapsed().as_millis() as u64;

        if context.is_cancelled() {
            return Ok(ToolResult::cancelled(elapsed()));
        }

        let desc = parsed.description.clone().unwrap_or_else(|| parsed.command.clone());
        let confirmed = context
            .confirm(ConfirmationRequest::new("execute", &parsed.command).preview(desc))
            .await?;
        if !confirmed {
            return Ok(ToolResult::denied(elapsed()));
        }

        let command = Self::normalize_command(&parsed.command, context.shell_config());
        let timeout_ms = parsed.timeout.unwrap_or(Self::DEFAULT_TIMEOUT_MS).min(Self::MAX_TIMEOUT_MS);

        let shell_config = context.shell_config();
        let mut cmd = Command::new(shell_config.executable());
        for arg in shell_config.exec_args() {
            cmd.arg(arg);
        }
        cmd.arg(&command);
        cmd.current_dir(context.working_dir());
        for (key, value) in context.env() {
            cmd.env(key, value);
        }
        for (key, value) in shell_config.env_vars() {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Failed to spawn process: {e}"), elapsed())),
        };

        let deadline = Duration::from_millis(timeout_ms);
        let start = Instant::now();
        let status = loop {
            if start.elapsed() >= deadline {
                let _ = child.kill().await;
                return Ok(ToolResult::error(format!("Command timed out after {timeout_ms} ms"), elapsed()));
            }
            if context.is_cancelled() {
                let _ = child.kill().await;
                return Ok(ToolResult::cancelled(elapsed()));
            }
            tokio::select! {
                result = child.wait() => break result,
                _ = sleep(Duration::from_millis(Self::CANCEL_POLL_MS)) => continue,
            }
        };

        let status = match status {
            Ok(s) => s,
            Err(e) => return Ok(ToolResult::error(format!("Process error: {e}"), elapsed())),
        };

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            let _ = stdout.read_to_end(&mut stdout_buf).await;
        }
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_end(&mut stderr_buf).await;
        }

        let stdout = String::from_utf8_lossy(&stdout_buf);
        let stderr = String::from_utf8_lossy(&stderr_buf);
        let mut output = String::new();
        if !stdout.is_empty() {
            output.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("[stderr]\n");
            output.push_str(&stderr);
        }
        if output.len() > Self::MAX_OUTPUT_SIZE {
            output.truncate(Self::MAX_OUTPUT_SIZE);
            output.push_str("\n... [output truncated]");
        }

        let exit_code = status.code().unwrap_or(-1);
        if status.success() {
            if output.is_empty() {
                Ok(ToolResult::success("[Command completed successfully with no output]", elapsed()))
            } else {
                Ok(ToolResult::success(output, elapsed()))
            }
        } else if output.is_empty() {
            Ok(ToolResult::error(format!("Command failed with exit code {exit_code}"), elapsed()))
        } else {
            Ok(ToolResult::error(format!("Exit code {exit_code}\n{output}"), elapsed()))
        }
    }
}

/// Heuristic resource-access extraction for a bash command: read-only
/// utilities map to a read access on their first path-like argument,
/// mutating utilities to a wildcard write, and anything we can't parse
/// confidently to the conservative wildcard write.
pub fn resource_access_for(args: &Value) -> Option<ResourceAccess> {
    let command = args.get("command")?.as_str()?.trim();
    let mut parts = command.split_whitespace();
    let program = parts.next()?;

    const READ_ONLY: &[&str] = &["cat", "grep", "head", "tail", "less"];
    const MUTATING: &[&str] = &["echo", "tee", "mv", "cp", "rm", "mkdir"];

    if READ_ONLY.contains(&program) {
        if let Some(target) = parts.find(|p| !p.starts_with('-')) {
            return Some(ResourceAccess::file_read(target));
        }
    }

    if MUTATING.contains(&program) || command.contains('>') {
        return Some(ResourceAccess::new(ResourceType::File, "*", ResourceMode::Write));
    }

    Some(ResourceAccess::new(ResourceType::File, "*", ResourceMode::Write))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta() {
        let tool = BashTool::new();
        let meta = tool.meta();
        assert_eq!(meta.name, "bash");
        assert_eq!(meta.category, "execute");
        assert!(meta.requires_confirmation);
    }

    #[test]
    fn test_schema() {
        let tool = BashTool::new();
        let schema = tool.schema();
        assert!(schema["properties"]["command"].is_object());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let tool = BashTool::new();
        assert!(!tool.validate(&json!({"command": "   "})).is_ok());
        assert!(tool.validate(&json!({"command": "ls -la"})).is_ok());
    }

    #[test]
    fn read_only_command_yields_read_access() {
        let access = resource_access_for(&json!({"command": "cat /tmp/a.txt"})).unwrap();
        assert_eq!(access.mode, ResourceMode::Read);
        assert_eq!(access.identifier, "/tmp/a.txt");
    }

    #[test]
    fn mutating_command_yields_wildcard_write() {
        let access = resource_access_for(&json!({"command": "rm -rf /tmp/a"})).unwrap();
        assert!(access.is_wildcard());
        assert_eq!(access.mode, ResourceMode::Write);
    }

    #[test]
    fn redirect_yields_wildcard_write() {
        let access = resource_access_for(&json!({"command": "echo hi > /tmp/out.txt"})).unwrap();
        assert!(access.is_wildcard());
    }

    #[test]
    fn unrecognized_command_defaults_to_wildcard_write() {
        let access = resource_access_for(&json!({"command": "some-custom-tool --flag"})).unwrap();
        assert!(access.is_wildcard());
        assert_eq!(access.mode, ResourceMode::Write);
    }
}
