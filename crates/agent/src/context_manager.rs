//! Context manager (C7): trims an over-long message list down to something
//! that fits the model's context window, and raises an advisory warning
//! before that point is reached.
//!
//! Grounded in `compressor.rs`'s struct-config idiom (threshold,
//! `keep_recent_messages`, `preserve_system_prompt`), but scaled down to the
//! narrow contract the core actually needs: `prepareMessages`/`shouldWarn`.
//! Token counting uses a plain character-count heuristic (~4 chars/token)
//! rather than a real tokenizer, since none is wired into this crate.

use anvil_provider::{Message, MessageRole};

const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct ContextManagerConfig {
    /// Soft cap on estimated tokens kept across prepared messages.
    pub max_context_tokens: usize,
    /// Fraction of `max_context_tokens` at which `should_warn` fires.
    pub warn_threshold: f32,
    /// Always keep the leading system message, if present, even when
    /// trimming would otherwise drop it.
    pub preserve_system_prompt: bool,
}

impl Default for ContextManagerConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 200_000,
            warn_threshold: 0.92,
            preserve_system_prompt: true,
        }
    }
}

pub struct ContextWarning {
    pub warn: bool,
    pub message: Option<String>,
}

pub struct ContextManager {
    config: ContextManagerConfig,
}

impl ContextManager {
    pub fn new(config: ContextManagerConfig) -> Self {
        Self { config }
    }

    fn estimate_tokens(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| m.content.len() / CHARS_PER_TOKEN)
            .sum()
    }

    /// Drop the oldest non-system messages until the estimated token count
    /// fits the budget. Preserves the leading system message (when present
    /// and configured to) and role ordering; never grows the list.
    pub fn prepare_messages(&self, messages: &[Message]) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }

        let system = if self.config.preserve_system_prompt {
            messages.first().filter(|m| m.role == MessageRole::System).cloned()
        } else {
            None
        };

        let rest_start = if system.is_some() { 1 } else { 0 };
        let mut rest: Vec<Message> = messages[rest_start..].to_vec();

        let budget = self.config.max_context_tokens;
        let system_tokens = system.as_ref().map(|m| m.content.len() / CHARS_PER_TOKEN).unwrap_or(0);

        while system_tokens + Self::estimate_tokens(&rest) > budget && !rest.is_empty() {
            rest.remove(0);
        }

        let mut out = Vec::with_capacity(rest.len() + 1);
        if let Some(sys) = system {
            out.push(sys);
        }
        out.extend(rest);
        out
    }

    /// Advisory warning; the core surfaces it but never blocks on it.
    pub fn should_warn(&self, messages: &[Message]) -> ContextWarning {
        let used = Self::estimate_tokens(messages);
        let threshold = (self.config.max_context_tokens as f32 * self.config.warn_threshold) as usize;
        if used >= threshold {
            ContextWarning {
                warn: true,
                message: Some(format!(
                    "context is at {} of {} estimated tokens ({:.0}%); consider starting a new branch",
                    used,
                    self.config.max_context_tokens,
                    100.0 * used as f32 / self.config.max_context_tokens as f32
                )),
            }
        } else {
            ContextWarning { warn: false, message: None }
        }
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(ContextManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str) -> Message {
        match role {
            MessageRole::System => Message::system(content),
            MessageRole::User => Message::user(content),
            MessageRole::Assistant => Message::assistant(content),
            MessageRole::Tool => Message::tool_result("id", content, false),
        }
    }

    #[test]
    fn prepare_messages_never_grows_the_list() {
        let cm = ContextManager::default();
        let messages = vec![msg(MessageRole::User, "hi"), msg(MessageRole::Assistant, "hello")];
        let prepared = cm.prepare_messages(&messages);
        assert!(prepared.len() <= messages.len());
    }

    #[test]
    fn prepare_messages_preserves_leading_system_message() {
        let config = ContextManagerConfig {
            max_context_tokens: 1,
            ..Default::default()
        };
        let cm = ContextManager::new(config);
        let messages = vec![
            msg(MessageRole::System, "you are a helpful assistant"),
            msg(MessageRole::User, "a very very very long message indeed"),
            msg(MessageRole::Assistant, "another very very long reply here"),
        ];
        let prepared = cm.prepare_messages(&messages);
        assert_eq!(prepared[0].role, MessageRole::System);
    }

    #[test]
    fn prepare_messages_preserves_role_ordering() {
        let cm = ContextManager::default();
        let messages = vec![
            msg(MessageRole::System, "sys"),
            msg(MessageRole::User, "u1"),
            msg(MessageRole::Assistant, "a1"),
            msg(MessageRole::User, "u2"),
        ];
        let prepared = cm.prepare_messages(&messages);
        let roles: Vec<_> = prepared.iter().map(|m| m.role).collect();
        let original_roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, original_roles);
    }

    #[test]
    fn should_warn_fires_past_threshold() {
        let config = ContextManagerConfig {
            max_context_tokens: 100,
            warn_threshold: 0.5,
            preserve_system_prompt: true,
        };
        let cm = ContextManager::new(config);
        let long_message = msg(MessageRole::User, &"x".repeat(4 * 60));
        let warning = cm.should_warn(std::slice::from_ref(&long_message));
        assert!(warning.warn);
        assert!(warning.message.is_some());
    }

    #[test]
    fn should_warn_is_silent_under_threshold() {
        let cm = ContextManager::default();
        let messages = vec![msg(MessageRole::User, "short")];
        let warning = cm.should_warn(&messages);
        assert!(!warning.warn);
    }
}
