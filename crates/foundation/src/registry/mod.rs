//! Registries persisted independently of the agentic core itself.
//!
//! - `provider` - configured LM provider credentials/endpoints

pub mod provider;

pub use provider::{Provider, ProviderConfig, ProviderType, PROVIDERS_FILE};
