//! `view_file`: read file contents with line numbers, offset/limit support,
//! and binary-file detection.

use async_trait::async_trait;
use anvil_foundation::{
    Error, Result, ResourceAccess, Tool, ToolContext, ToolMeta, ToolMetadata, ToolResult,
    ValidationOutcome,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct ReadInput {
    #[serde(alias = "path")]
    pub file_path: String,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

pub struct ReadTool;

impl ReadTool {
    pub fn new() -> Self {
        Self
    }

    pub const NAME: &'static str = "view_file";
    const DEFAULT_LIMIT: u32 = 2000;
    const MAX_LINE_LENGTH: usize = 2000;

    fn is_binary_file(path: &Path) -> bool {
        const BINARY_EXTENSIONS: &[&str] = &[
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "doc", "docx", "xls",
            "xlsx", "ppt", "pptx", "zip", "tar", "gz", "rar", "7z", "exe", "dll", "so", "dylib",
            "mp3", "mp4", "avi", "mov", "mkv", "woff", "woff2", "ttf", "otf",
        ];

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| BINARY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn read_with_line_numbers(path: &Path, offset: u32, limit: u32) -> Result<String> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);

        let mut output = String::new();
        let start_line = offset.max(1) as usize;
        let end_line = start_line + limit as usize;

        for (idx, line_result) in reader.lines().enumerate() {
            let line_num = idx + 1;
            if line_num < start_line {
                continue;
            }
            if line_num >= end_line {
                break;
            }

            let line = line_result?;
            let truncated = if line.len() > Self::MAX_LINE_LENGTH {
                format!("{}... [truncated]", &line[..Self::MAX_LINE_LENGTH])
            } else {
                line
            };

            output.push_str(&format!("{:>6}\u{2192}{}\n", line_num, truncated));
        }

        Ok(output)
    }
}

impl Default for ReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .display_name("View File")
            .description("Read file contents with line numbers")
            .category("filesystem")
            .requires_confirmation(false)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Start line number (1-based). Only provide if the file is too large to read at once."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum lines to read (default: 2000). Only provide if the file is too large to read at once."
                }
            },
            "required": ["file_path"]
        })
    }

    fn validate(&self, args: &Value) -> ValidationOutcome {
        match args.get("file_path").and_then(|v| v.as_str()) {
            Some(p) if Path::new(p).is_absolute() => ValidationOutcome::ok(),
            Some(p) => ValidationOutcome::error(format!("file_path must be absolute, got: {p}")),
            None => ValidationOutcome::error("file_path is required"),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(self.name())
    }

    async fn execute(&self, args: Value, _context: &dyn ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let parsed: ReadInput =
            serde_json::from_value(args).map_err(|e| Error::Validation(e.to_string()))?;
        let path = Path::new(&parsed.file_path);
        let elapsed = || started.elapsed().as_millis() as u64;

        if !path.exists() {
            return Ok(ToolResult::error(
                format!("File not found: {}", parsed.file_path),
                elapsed(),
            ));
        }

        if path.is_dir() {
            return Ok(ToolResult::error(
                format!("Cannot read directory: {}", parsed.file_path),
                elapsed(),
            ));
        }

        if Self::is_binary_file(path) {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            return Ok(ToolResult::success(
                format!("[Binary file: {} - use an appropriate viewer for {} files]", parsed.file_path, ext),
                elapsed(),
            ));
        }

        let offset = parsed.offset.unwrap_or(1);
        let limit = parsed.limit.unwrap_or(Self::DEFAULT_LIMIT);

        match Self::read_with_line_numbers(path, offset, limit) {
            Ok(content) if content.is_empty() => Ok(ToolResult::success("[Empty file]", elapsed())),
            Ok(content) => Ok(ToolResult::success(content, elapsed())),
            Err(e) => Ok(ToolResult::error(format!("Failed to read file: {e}"), elapsed())),
        }
    }
}

/// Builds a `ResourceAccess` for a read argument, used by the dependency
/// scheduler to detect read/write conflicts without running the tool.
///
/// Accepts the same path key aliases the schema tolerates (`file_path`,
/// `path`) so the scheduler sees the same file the tool itself would read.
pub fn resource_access_for(args: &Value) -> Option<ResourceAccess> {
    args.get("file_path")
        .or_else(|| args.get("path"))
        .and_then(|v| v.as_str())
        .map(ResourceAccess::file_read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta() {
        let tool = ReadTool::new();
        let meta = tool.meta();
        assert_eq!(meta.name, "view_file");
        assert_eq!(meta.category, "filesystem");
        assert!(!meta.requires_confirmation);
    }

    #[test]
    fn test_schema() {
        let tool = ReadTool::new();
        let schema = tool.schema();
        assert!(schema["properties"]["file_path"].is_object());
    }

    #[test]
    fn test_validate_requires_absolute_path() {
        let tool = ReadTool::new();
        assert!(tool.validate(&json!({"file_path": "/abs/path.rs"})).is_ok());
        assert!(!tool.validate(&json!({"file_path": "relative.rs"})).is_ok());
        assert!(!tool.validate(&json!({})).is_ok());
    }

    #[test]
    fn test_binary_file_detection() {
        assert!(ReadTool::is_binary_file(Path::new("image.png")));
        assert!(ReadTool::is_binary_file(Path::new("doc.pdf")));
        assert!(!ReadTool::is_binary_file(Path::new("code.rs")));
        assert!(!ReadTool::is_binary_file(Path::new("readme.md")));
    }

    #[test]
    fn resource_access_is_a_read() {
        let access = resource_access_for(&json!({"file_path": "/tmp/a.txt"})).unwrap();
        assert!(!access.is_wildcard());
    }
}
