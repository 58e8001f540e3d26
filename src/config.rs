use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

use crate::error::{CreatorPilotError, Result};
use crate::router::RoutePlan;

pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";
pub const YT_ANALYTICS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/yt-analytics.readonly";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub scopes: Vec<String>,
    pub session_ttl_seconds: i64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:7879/auth/callback".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
            scopes: vec![
                YOUTUBE_READONLY_SCOPE.to_string(),
                YT_ANALYTICS_READONLY_SCOPE.to_string(),
            ],
            session_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct YouTubeConfig {
    pub analytics_base_url: String,
    pub data_base_url: String,
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            analytics_base_url: "https://youtubeanalytics.googleapis.com/v2".to_string(),
            data_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            cache_ttl_seconds: 300,
            cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub token_refresh_poll_seconds: u64,
    pub refresh_margin_seconds: i64,
    pub goal_sync_seconds: u64,
    pub goal_sync_days: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            token_refresh_poll_seconds: 300,
            refresh_margin_seconds: 600,
            goal_sync_seconds: 3600,
            goal_sync_days: 28,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Per-agent route overrides keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, RoutePlan>,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Config {
    pub fn convention_defaults() -> Self {
        Self {
            providers: ProvidersConfig {
                openai: Some(ProviderConfig {
                    api_key: None,
                    base_url: Some("https://api.openai.com/v1".to_string()),
                }),
                anthropic: Some(ProviderConfig {
                    api_key: None,
                    base_url: Some("https://api.anthropic.com/v1".to_string()),
                }),
                google: Some(ProviderConfig {
                    api_key: None,
                    base_url: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
                }),
            },
            ..Self::default()
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CreatorPilotError::Config(format!("failed to read {path}: {e}")))?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| CreatorPilotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_store(db_path: &str) -> Result<Self> {
        let config = crate::config_store::load_config(db_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (agent, plan) in &self.agents {
            if plan.primary.model.trim().is_empty() {
                return Err(CreatorPilotError::Config(format!(
                    "agent route for '{agent}' has an empty primary model"
                )));
            }
            if plan.primary.max_tokens == 0 {
                return Err(CreatorPilotError::Config(format!(
                    "agent route for '{agent}' has a zero token budget"
                )));
            }
        }
        if self.oauth.session_ttl_seconds <= 0 {
            return Err(CreatorPilotError::Config(
                "oauth.session_ttl_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Fills missing credentials from the environment, then the secret vault.
    pub fn resolve_secrets(mut self) -> Result<Self> {
        for (slot, env_name, secret_name) in [
            (&mut self.providers.openai, "OPENAI_API_KEY", "openai_api_key"),
            (
                &mut self.providers.anthropic,
                "ANTHROPIC_API_KEY",
                "anthropic_api_key",
            ),
            (&mut self.providers.google, "GOOGLE_API_KEY", "google_api_key"),
        ] {
            let provider = slot.get_or_insert_with(ProviderConfig::default);
            if provider.api_key.as_deref().is_some_and(|key| !key.trim().is_empty()) {
                continue;
            }
            provider.api_key = match env_value(env_name) {
                Some(value) => Some(value),
                None => crate::vault::get_secret(secret_name)?,
            };
        }

        if self.oauth.client_id.trim().is_empty() {
            if let Some(value) = env_value("YOUTUBE_CLIENT_ID") {
                self.oauth.client_id = value;
            }
        }
        if self.oauth.client_secret.is_none() {
            self.oauth.client_secret = match env_value("YOUTUBE_CLIENT_SECRET") {
                Some(value) => Some(value),
                None => crate::vault::get_secret("youtube_client_secret")?,
            };
        }
        Ok(self)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
