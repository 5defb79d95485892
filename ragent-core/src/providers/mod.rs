//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM)
//! - Google Gemini API (Gemini models)
//!
//! Use `create_provider()` to instantiate the provider selected by config.
//! Failures are returned as-is; callers decide whether a turn is retried.

pub mod gemini;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{ProviderKind, RagentConfig};
use crate::error::Result;
use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Create the completion provider selected by `config.provider`.
///
/// Fails with `ConfigError::UnsupportedProvider` for an unknown selector and
/// with `LlmError::AuthFailed` when the provider's API key is missing.
pub fn create_provider(config: &RagentConfig) -> Result<Arc<dyn LlmProvider>> {
    let (kind, settings) = config.active_provider()?;
    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiCompatibleProvider::new(settings)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(settings)?),
    };

    tracing::debug!(
        provider = kind.as_str(),
        model = provider.model_name(),
        "Created completion provider"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, LlmError, RagentError};

    #[test]
    fn test_create_provider_openai() {
        let mut config = RagentConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        config.openai.api_key = Some("sk-test".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
        assert_eq!(provider.provider_name(), "openai");
    }

    #[test]
    fn test_create_provider_gemini() {
        let mut config = RagentConfig {
            provider: "gemini".to_string(),
            ..Default::default()
        };
        config.gemini.api_key = Some("gm-test".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.0-flash");
        assert_eq!(provider.provider_name(), "gemini");
    }

    #[test]
    fn test_create_provider_unsupported() {
        let config = RagentConfig {
            provider: "anthropic".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(
            err,
            RagentError::Config(ConfigError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_create_provider_missing_key() {
        let mut config = RagentConfig {
            provider: "gemini".to_string(),
            ..Default::default()
        };
        config.gemini.api_key_env = "RAGENT_TEST_FACTORY_KEY_MISSING".to_string();
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, RagentError::Llm(LlmError::AuthFailed { .. })));
    }
}
