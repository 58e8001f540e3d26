use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::config::ProvidersConfig;
use crate::error::CreatorPilotError;
use crate::interfaces::providers::{LlmProvider, ProviderKind};

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

pub type ProviderMap = HashMap<ProviderKind, Arc<dyn LlmProvider>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Maps a non-success provider response onto the error taxonomy.
pub(crate) fn status_error(provider: ProviderKind, status: StatusCode, body: &str) -> CreatorPilotError {
    let detail = format!("{provider} request failed ({status}): {}", truncate(body, 400));
    match status {
        StatusCode::UNAUTHORIZED => CreatorPilotError::Unauthorized(detail),
        StatusCode::FORBIDDEN => CreatorPilotError::Forbidden(detail),
        StatusCode::TOO_MANY_REQUESTS => CreatorPilotError::RateLimited(detail),
        StatusCode::NOT_FOUND => CreatorPilotError::NotFound(detail),
        _ => CreatorPilotError::Provider(detail),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn configured_key(config: Option<&crate::config::ProviderConfig>) -> Option<(String, Option<String>)> {
    let config = config?;
    let key = config.api_key.as_deref()?.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), config.base_url.clone()))
}

/// Instantiates every provider that has an API key.
pub fn build_providers(config: &ProvidersConfig) -> ProviderMap {
    let mut providers: ProviderMap = HashMap::new();
    if let Some((key, base_url)) = configured_key(config.openai.as_ref()) {
        providers.insert(ProviderKind::OpenAi, Arc::new(OpenAiProvider::new(key, base_url)));
    }
    if let Some((key, base_url)) = configured_key(config.anthropic.as_ref()) {
        providers.insert(
            ProviderKind::Anthropic,
            Arc::new(AnthropicProvider::new(key, base_url)),
        );
    }
    if let Some((key, base_url)) = configured_key(config.google.as_ref()) {
        providers.insert(ProviderKind::Google, Arc::new(GoogleProvider::new(key, base_url)));
    }
    tracing::info!(
        configured = ?providers.keys().map(|kind| kind.as_str()).collect::<Vec<_>>(),
        "Model providers ready"
    );
    providers
}
