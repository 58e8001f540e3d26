use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CreatorPilotError, Result};
use crate::interfaces::providers::{ChatMessage, Completion, CompletionRequest, ProviderKind};
use crate::providers::ProviderMap;

const MIN_TOKEN_BUDGET: u32 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl Depth {
    fn multiplier(self) -> f32 {
        match self {
            Self::Quick => 0.5,
            Self::Standard => 1.0,
            Self::Deep => 2.0,
        }
    }

    pub fn scale(self, base_tokens: u32) -> u32 {
        let scaled = (base_tokens as f32 * self.multiplier()).round() as u32;
        scaled.max(MIN_TOKEN_BUDGET)
    }
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Budget at `Depth::Standard`.
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ModelConfig {
    fn new(provider: ProviderKind, model: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            provider,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub primary: ModelConfig,
    #[serde(default)]
    pub fallback: Option<ModelConfig>,
}

/// Built-in routing table keyed by agent id.
pub fn default_route(agent: &str) -> RoutePlan {
    use ProviderKind::{Anthropic, Google, OpenAi};
    let (primary, fallback) = match agent {
        "boss" => (
            ModelConfig::new(Anthropic, "claude-3-5-sonnet-latest", 2000, 0.5),
            ModelConfig::new(OpenAi, "gpt-4o", 2000, 0.5),
        ),
        "alex" => (
            ModelConfig::new(OpenAi, "gpt-4o", 1500, 0.8),
            ModelConfig::new(Anthropic, "claude-3-5-haiku-latest", 1500, 0.8),
        ),
        "audience" => (
            ModelConfig::new(Google, "gemini-1.5-pro", 1500, 0.6),
            ModelConfig::new(OpenAi, "gpt-4o-mini", 1500, 0.6),
        ),
        "seo" => (
            ModelConfig::new(OpenAi, "gpt-4o-mini", 1000, 0.4),
            ModelConfig::new(Google, "gemini-1.5-flash", 1000, 0.4),
        ),
        "monetization" => (
            ModelConfig::new(Anthropic, "claude-3-5-sonnet-latest", 1500, 0.5),
            ModelConfig::new(OpenAi, "gpt-4o", 1500, 0.5),
        ),
        _ => (
            ModelConfig::new(OpenAi, "gpt-4o-mini", 1000, 0.7),
            ModelConfig::new(Anthropic, "claude-3-5-haiku-latest", 1000, 0.7),
        ),
    };
    RoutePlan {
        primary,
        fallback: Some(fallback),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedResponse {
    pub content: String,
    pub provider: ProviderKind,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub success: bool,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ModelRouter {
    providers: ProviderMap,
    overrides: HashMap<String, RoutePlan>,
}

impl ModelRouter {
    pub fn new(providers: ProviderMap, overrides: HashMap<String, RoutePlan>) -> Self {
        Self {
            providers,
            overrides,
        }
    }

    pub fn plan_for(&self, agent: &str) -> RoutePlan {
        self.overrides
            .get(agent)
            .cloned()
            .unwrap_or_else(|| default_route(agent))
    }

    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    async fn attempt(
        &self,
        config: &ModelConfig,
        messages: &[ChatMessage],
        depth: Depth,
    ) -> Result<Completion> {
        let provider = self.providers.get(&config.provider).ok_or_else(|| {
            CreatorPilotError::Config(format!("provider {} is not configured", config.provider))
        })?;
        let request = CompletionRequest {
            model: config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: depth.scale(config.max_tokens),
            temperature: config.temperature,
        };
        provider.complete(&request).await
    }

    /// One primary attempt, then at most one fallback attempt. Provider
    /// failures are reported in the response rather than as `Err`.
    pub async fn route(&self, agent: &str, messages: &[ChatMessage], depth: Depth) -> RoutedResponse {
        let plan = self.plan_for(agent);
        let started = Instant::now();

        let primary_err = match self.attempt(&plan.primary, messages, depth).await {
            Ok(completion) => {
                let response = success_response(&plan.primary, completion, started, false);
                info!(
                    agent,
                    provider = %response.provider,
                    model = %response.model,
                    latency_ms = response.latency_ms,
                    "Routed completion"
                );
                return response;
            }
            Err(err) => err,
        };

        let Some(fallback) = plan.fallback.as_ref() else {
            warn!(agent, provider = %plan.primary.provider, "Primary model failed with no fallback: {}", primary_err);
            return failure_response(&plan.primary, primary_err, started, false);
        };

        warn!(
            agent,
            primary = %plan.primary.provider,
            fallback = %fallback.provider,
            "Primary model failed, trying fallback: {}",
            primary_err
        );
        match self.attempt(fallback, messages, depth).await {
            Ok(completion) => {
                let response = success_response(fallback, completion, started, true);
                info!(
                    agent,
                    provider = %response.provider,
                    model = %response.model,
                    latency_ms = response.latency_ms,
                    "Routed completion via fallback"
                );
                response
            }
            Err(err) => {
                warn!(agent, "Fallback model failed: {}", err);
                failure_response(fallback, err, started, true)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn success_response(
    config: &ModelConfig,
    completion: Completion,
    started: Instant,
    fallback_used: bool,
) -> RoutedResponse {
    RoutedResponse {
        content: completion.content,
        provider: config.provider,
        model: completion.model,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        latency_ms: elapsed_ms(started),
        success: true,
        fallback_used,
        error: None,
    }
}

fn failure_response(
    config: &ModelConfig,
    err: CreatorPilotError,
    started: Instant,
    fallback_used: bool,
) -> RoutedResponse {
    RoutedResponse {
        content: String::new(),
        provider: config.provider,
        model: config.model.clone(),
        input_tokens: 0,
        output_tokens: 0,
        latency_ms: elapsed_ms(started),
        success: false,
        fallback_used,
        error: Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_scales_budget_monotonically_with_floor() {
        assert_eq!(Depth::Quick.scale(2000), 1000);
        assert_eq!(Depth::Standard.scale(2000), 2000);
        assert_eq!(Depth::Deep.scale(2000), 4000);
        assert_eq!(Depth::Quick.scale(300), MIN_TOKEN_BUDGET);
        for base in [100u32, 700, 1500, 4096] {
            assert!(Depth::Quick.scale(base) <= Depth::Standard.scale(base));
            assert!(Depth::Standard.scale(base) <= Depth::Deep.scale(base));
        }
    }

    #[test]
    fn every_builtin_agent_has_a_cross_provider_fallback() {
        for agent in ["boss", "alex", "audience", "seo", "monetization", "unknown"] {
            let plan = default_route(agent);
            let fallback = plan.fallback.expect("fallback");
            assert_ne!(plan.primary.provider, fallback.provider, "{agent}");
        }
    }

    #[test]
    fn overrides_replace_builtin_routes() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "seo".to_string(),
            RoutePlan {
                primary: ModelConfig::new(ProviderKind::Google, "gemini-2.0-flash", 800, 0.3),
                fallback: None,
            },
        );
        let router = ModelRouter::new(HashMap::new(), overrides);
        assert_eq!(router.plan_for("seo").primary.model, "gemini-2.0-flash");
        assert_eq!(router.plan_for("alex"), default_route("alex"));
    }

    #[test]
    fn depth_parses_from_wire_names() {
        let depth: Depth = serde_json::from_str("\"deep\"").unwrap();
        assert_eq!(depth, Depth::Deep);
        assert_eq!(Depth::default(), Depth::Standard);
    }
}
