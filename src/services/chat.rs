use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agents::{AgentPersona, AgentRegistry, BOSS_AGENT};
use crate::error::{CreatorPilotError, Result};
use crate::interfaces::providers::{ChatMessage, ChatRole};
use crate::router::{Depth, ModelRouter, RoutedResponse};
use crate::youtube::{ChannelAnalytics, ChannelHealth, DEFAULT_HEALTH_DAYS};

pub const MAX_HISTORY_TURNS: usize = 20;
const MAX_MESSAGE_CHARS: usize = 8_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    /// Defaults to the Boss Agent, which may delegate.
    #[serde(default)]
    pub agent: Option<String>,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub depth: Depth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub agent: String,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_from: Option<String>,
    pub used_channel_context: bool,
    pub reply: RoutedResponse,
}

pub struct AgentService {
    router: Arc<ModelRouter>,
    registry: AgentRegistry,
    analytics: Option<Arc<ChannelAnalytics>>,
}

impl AgentService {
    pub fn new(router: Arc<ModelRouter>, analytics: Option<Arc<ChannelAnalytics>>) -> Self {
        Self {
            router,
            registry: AgentRegistry,
            analytics,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(CreatorPilotError::Validation("user_id is required".to_string()));
        }
        let message = request.message.trim();
        if message.is_empty() {
            return Err(CreatorPilotError::Validation("message is required".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(CreatorPilotError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let requested = request
            .agent
            .as_deref()
            .map(str::trim)
            .filter(|agent| !agent.is_empty())
            .unwrap_or(BOSS_AGENT);
        let persona = self
            .registry
            .get(requested)
            .ok_or_else(|| CreatorPilotError::NotFound(format!("agent '{requested}'")))?;

        let (persona, delegated_from) = if persona.id == BOSS_AGENT {
            match self.registry.delegate(message) {
                Some(specialist) => {
                    debug!(user_id, specialist = specialist.id, "Boss Agent delegated request");
                    (specialist, Some(BOSS_AGENT.to_string()))
                }
                None => (persona, None),
            }
        } else {
            (persona, None)
        };

        let context = self.channel_context(user_id).await;
        let messages = build_messages(persona, context.as_deref(), &request.history, message);
        let reply = self.router.route(persona.id, &messages, request.depth).await;
        info!(
            user_id,
            agent = persona.id,
            success = reply.success,
            fallback_used = reply.fallback_used,
            "Agent chat completed"
        );

        Ok(ChatReply {
            agent: persona.id.to_string(),
            agent_name: persona.name.to_string(),
            delegated_from,
            used_channel_context: context.is_some(),
            reply,
        })
    }

    async fn channel_context(&self, user_id: &str) -> Option<String> {
        let analytics = self.analytics.as_ref()?;
        match analytics.channel_health(user_id, DEFAULT_HEALTH_DAYS).await {
            Ok(health) => Some(format_channel_context(&health)),
            Err(CreatorPilotError::Unauthorized(_)) => None,
            Err(err) => {
                warn!(user_id, "Chat continues without channel context: {}", err);
                None
            }
        }
    }
}

pub fn format_channel_context(health: &ChannelHealth) -> String {
    format!(
        "CHANNEL HEALTH (last {days} days):\n\
         - Views: {views} total, {avg:.0}/day, trend {trend:+.1}%\n\
         - Net subscribers: {subs:+}\n\
         - Engagement rate: {engagement:.2}%\n\
         - Watch time: {minutes:.0} minutes\n\
         - Health score: {score}/100 (grade {grade})",
        days = health.days,
        views = health.total_views,
        avg = health.avg_daily_views,
        trend = health.views_trend_percent,
        subs = health.net_subscribers,
        engagement = health.engagement_rate,
        minutes = health.watch_minutes,
        score = health.score,
        grade = health.grade,
    )
}

/// System prompt, optional channel block, trimmed history, then the new message.
pub fn build_messages(
    persona: &AgentPersona,
    channel_context: Option<&str>,
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(persona.full_system_prompt())];
    if let Some(context) = channel_context {
        messages.push(ChatMessage::system(context));
    }
    // Clients cannot inject system turns.
    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|turn| turn.role != ChatRole::System && !turn.content.trim().is_empty())
        .collect();
    let skip = turns.len().saturating_sub(MAX_HISTORY_TURNS);
    messages.extend(turns.into_iter().skip(skip).cloned());
    messages.push(ChatMessage::user(message));
    messages
}
