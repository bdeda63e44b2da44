//! LLM Provider implementations

pub mod anthropic;
pub mod gemini;
pub mod groq;
pub mod ollama;
pub mod openai;
