//! Provider selection from configuration.

use std::sync::Arc;

use deckhand_config::AppConfig;
use deckhand_core::provider::Provider;
use tracing::{debug, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Build the model-call provider described by `config`.
///
/// Every supported endpoint speaks the OpenAI chat completions protocol, so
/// this always yields an [`OpenAiCompatProvider`]; the name is derived from
/// the host for logging.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        warn!("No API key configured; model calls will be rejected by the endpoint");
    }

    let name = provider_name_for(&config.api_url);
    debug!(provider = name, url = %config.api_url, "Building provider");

    Arc::new(OpenAiCompatProvider::new(name, &config.api_url, api_key))
}

/// Name a provider after the well-known host it points at.
fn provider_name_for(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("localhost:11434") || base_url.contains("127.0.0.1:11434") {
        "ollama"
    } else {
        "custom"
    }
}
