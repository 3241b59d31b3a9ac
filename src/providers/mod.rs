// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model provider implementations.
//!
//! - [`anthropic::AnthropicProvider`] - Claude models via the Anthropic Messages API
//!
//! # Quick Start
//!
//! ```bash
//! export ANTHROPIC_API_KEY=your-key
//! ```
//!
//! ```rust,ignore
//! use fanout::providers::create_provider_from_env;
//!
//! let provider = create_provider_from_env()?;
//! let response = provider.chat(&messages, Some(&tools), None).await?;
//! ```

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::error::ProviderError;
use crate::types::{ProviderConfig, SharedProvider};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Anthropic API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Create a provider from explicit configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] if the API key is missing.
///
/// # Example
///
/// ```rust,ignore
/// let config = ProviderConfig::new("your-key", "claude-3-5-sonnet-20241022");
/// let provider = create_provider(config)?;
/// ```
pub fn create_provider(config: ProviderConfig) -> Result<SharedProvider, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::NotConfigured("API key required for Anthropic".to_string()))?;

    let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let base_url = config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Ok(Arc::new(AnthropicProvider::new(api_key, model, base_url, config)?))
}

/// Create a provider from environment variables.
///
/// | Variable | Description |
/// |----------|-------------|
/// | `ANTHROPIC_API_KEY` | Anthropic API key (required) |
/// | `ANTHROPIC_BASE_URL` | Custom API base URL |
/// | `FANOUT_MODEL` | Override default model |
pub fn create_provider_from_env() -> Result<SharedProvider, ProviderError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| ProviderError::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;

    let config = ProviderConfig {
        api_key: Some(api_key),
        model: std::env::var("FANOUT_MODEL").ok(),
        base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
        ..Default::default()
    };

    create_provider(config)
}

/// Create a provider from a resolved configuration.
///
/// The API key always comes from the environment; configuration files
/// never hold it.
pub fn create_provider_from_config(config: &ResolvedConfig) -> Result<SharedProvider, ProviderError> {
    let provider_config = ProviderConfig {
        api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
        model: Some(config.model.clone()),
        base_url: config.base_url.clone(),
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
        timeout_ms: None,
    };
    create_provider(provider_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key() {
        let result = create_provider(ProviderConfig::default());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));

        let empty = create_provider(ProviderConfig::new("", "m"));
        assert!(matches!(empty, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_create_provider_defaults_model() {
        let config = ProviderConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let provider = create_provider(config).unwrap();
        assert_eq!(provider.name(), "Anthropic");
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_create_provider_explicit_model() {
        let config = ProviderConfig::new("test-key", "claude-3-haiku-20240307").with_max_tokens(256);
        let provider = create_provider(config).unwrap();
        assert_eq!(provider.model(), "claude-3-haiku-20240307");
    }
}
