//! `str_replace_editor`: exact string replacement in a file, confirmed
//! before it writes.

use async_trait::async_trait;
use anvil_foundation::{
    ConfirmationRequest, Error, Result, ResourceAccess, Tool, ToolContext, ToolMeta,
    ToolMetadata, ToolResult, ValidationOutcome,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct EditInput {
    #[serde(alias = "path")]
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

pub struct EditTool;

impl EditTool {
    pub fn new() -> Self {
        Self
    }

    pub const NAME: &'static str = "str_replace_editor";

    fn is_sensitive_path(path: &str) -> bool {
        const SENSITIVE_PATTERNS: &[&str] = &[
            ".env", ".ssh", "credentials", "secrets", ".pem", ".key", "_rsa", ".aws",
            ".config/gcloud",
        ];
        let path_lower = path.to_lowercase();
        SENSITIVE_PATTERNS.iter().any(|p| path_lower.contains(p))
    }
}

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .display_name("Edit File")
            .description("Performs exact string replacements in files")
            .category("filesystem")
            .requires_confirmation(true)
            .modifies_files(true)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The absolute path to the file to modify"
                },
                "old_string": {
                    "type": "string",
                    "description": "The text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The text to replace it with (must be different from old_string)"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences of old_string (default: false)",
                    "default": false
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    fn validate(&self, args: &Value) -> ValidationOutcome {
        let Some(path) = args
            .get("file_path")
            .or_else(|| args.get("path"))
            .and_then(|v| v.as_str())
        else {
            return ValidationOutcome::error("file_path is required");
        };
        if !Path::new(path).is_absolute() {
            return ValidationOutcome::error(format!("file_path must be absolute, got: {path}"));
        }
        let old = args.get("old_string").and_then(|v| v.as_str()).unwrap_or("");
        let new = args.get("new_string").and_then(|v| v.as_str()).unwrap_or("");
        if old.is_empty() {
            return ValidationOutcome::error("old_string cannot be empty");
        }
        if old == new {
            return ValidationOutcome::error("old_string and new_string must be different");
        }
        ValidationOutcome::ok()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(self.name()).side_effects(true)
    }

    async fn execute(&self, args: Value, context: &dyn ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let parsed: EditInput =
            serde_json::from_value(args).map_err(|e| Error::Validation(e.to_string()))?;
        let path = Path::new(&parsed.file_path);
        let elapsed = || started.elapsed().as_millis() as u64;

        if !path.exists() {
            return Ok(ToolResult::error(format!("File not found: {}", parsed.file_path), elapsed()));
        }
        if path.is_dir() {
            return Ok(ToolResult::error(format!("Cannot edit directory: {}", parsed.file_path), elapsed()));
        }
        if Self::is_sensitive_path(&parsed.file_path) {
            return Ok(ToolResult::error(format!("Cannot edit sensitive file: {}", parsed.file_path), elapsed()));
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read file: {e}"), elapsed())),
        };

        let match_count = content.matches(&parsed.old_string).count();
        if match_count == 0 {
            return Ok(ToolResult::error(
                "old_string not found in file. Make sure to include exact content including whitespace and indentation.",
                elapsed(),
            ));
        }
        if !parsed.replace_all && match_count > 1 {
            return Ok(ToolResult::error(
                format!(
                    "old_string found {match_count} times in file. Either provide a larger string with more context to make it unique, or set replace_all to true."
                ),
                elapsed(),
            ));
        }

        let preview = format!(
            "{} -> {} ({} occurrence{})",
            parsed.old_string,
            parsed.new_string,
            match_count,
            if match_count == 1 { "" } else { "s" }
        );
        let confirmed = context
            .confirm(ConfirmationRequest::new("edit", &parsed.file_path).preview(preview))
            .await?;
        if !confirmed {
            return Ok(ToolResult::denied(elapsed()));
        }

        let new_content = if parsed.replace_all {
            content.replace(&parsed.old_string, &parsed.new_string)
        } else {
            content.replacen(&parsed.old_string, &parsed.new_string, 1)
        };

        match fs::write(path, &new_content) {
            Ok(()) => {
                let replaced = if parsed.replace_all {
                    format!("{match_count} occurrences")
                } else {
                    "1 occurrence".to_string()
                };
                let mut result = ToolResult::success(
                    format!("Edited {}: replaced {replaced}", parsed.file_path),
                    elapsed(),
                );
                result.modified = true;
                Ok(result)
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to write file: {e}"), elapsed())),
        }
    }
}

/// Builds the `ResourceAccess` the scheduler needs for conflict detection.
///
/// Accepts the same path key aliases the schema tolerates (`file_path`,
/// `path`) so the scheduler sees the same file the tool itself would write.
pub fn resource_access_for(args: &Value) -> Option<ResourceAccess> {
    args.get("file_path")
        .or_else(|| args.get("path"))
        .and_then(|v| v.as_str())
        .map(ResourceAccess::file_write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta() {
        let tool = EditTool::new();
        let meta = tool.meta();
        assert_eq!(meta.name, "str_replace_editor");
        assert_eq!(meta.category, "filesystem");
        assert!(meta.requires_confirmation);
    }

    #[test]
    fn test_schema() {
        let tool = EditTool::new();
        let schema = tool.schema();
        assert!(schema["properties"]["old_string"].is_object());
        assert!(schema["properties"]["new_string"].is_object());
    }

    #[test]
    fn test_validate_rejects_identical_strings() {
        let tool = EditTool::new();
        let args = json!({"file_path": "/tmp/x.txt", "old_string": "a", "new_string": "a"});
        assert!(!tool.validate(&args).is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_path() {
        let tool = EditTool::new();
        let args = json!({"file_path": "x.txt", "old_string": "a", "new_string": "b"});
        assert!(!tool.validate(&args).is_ok());
    }

    #[test]
    fn test_sensitive_path_detection() {
        assert!(EditTool::is_sensitive_path("/home/user/.env"));
        assert!(EditTool::is_sensitive_path("/app/.ssh/config"));
        assert!(!EditTool::is_sensitive_path("/home/user/code.rs"));
    }

    #[test]
    fn resource_access_is_a_write() {
        let access = resource_access_for(&json!({"file_path": "/tmp/a.txt"})).unwrap();
        assert_eq!(access.mode, anvil_foundation::ResourceMode::Write);
    }
}
