//! Error types shared by every layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool} - {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Denied by user: {0}")]
    Denied(String),

    #[error("Auth failure for profile {profile}: {message}")]
    AuthFailure { profile: String, message: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Budget exceeded: used {used:.4} of {limit:.4}")]
    Budget { used: f64, limit: f64 },

    #[error("Hook error in stage {stage}: {message}")]
    Hook { stage: String, message: String },

    #[error("Branch error: {0}")]
    Branch(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Scheduler error: {0}")]
    Schedule(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a failed operation carrying this error is worth retrying
    /// (e.g. with the next healthy auth profile).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::AuthFailure { .. } | Error::Provider(_))
    }

    /// Whether this error's message is safe to surface directly to the user
    /// rather than feeding it back to the model.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Denied(_) | Error::NotFound(_) | Error::Validation(_) | Error::Cancelled(_) | Error::Budget { .. }
        )
    }

    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn auth_failure(profile: impl Into<String>, message: impl Into<String>) -> Self {
        Error::AuthFailure {
            profile: profile.into(),
            message: message.into(),
        }
    }

    pub fn hook(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Hook {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Timeout("slow".into()).is_retryable());
        assert!(Error::auth_failure("p1", "expired").is_retryable());
        assert!(!Error::Validation("bad arg".into()).is_retryable());
    }

    #[test]
    fn user_facing_classification() {
        assert!(Error::Denied("no".into()).is_user_facing());
        assert!(Error::Budget { used: 10.0, limit: 5.0 }.is_user_facing());
        assert!(!Error::Internal("oops".into()).is_user_facing());
    }
}
