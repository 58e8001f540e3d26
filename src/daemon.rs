use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

use crate::cards::{CardFilter, CardPatch, CardStatus, CardStore, NewCard};
use crate::config::Config;
use crate::config_store;
use crate::error::{CreatorPilotError, Result};
use crate::goals::{GoalPatch, GoalStatus, GoalStore, NewGoal};
use crate::interfaces::analytics::AnalyticsSource;
use crate::oauth::OAuthManager;
use crate::providers::build_providers;
use crate::router::{ModelConfig, ModelRouter};
use crate::scheduler::{seconds, GoalSyncJob, Scheduler, TokenRefreshJob};
use crate::services::events::{publish, AppEvent};
use crate::services::{AgentService, ChatRequest};
use crate::suggestions::{Feedback, NewSuggestion, SuggestionFilter, SuggestionStore, SuggestionType};
use crate::youtube::{clamp_days, ChannelAnalytics, ReportCache, YouTubeAnalyticsClient};

#[derive(Clone)]
pub struct AppState {
    pub cards: Arc<CardStore>,
    pub goals: Arc<GoalStore>,
    pub suggestions: Arc<SuggestionStore>,
    pub oauth: Arc<OAuthManager>,
    pub analytics: Arc<ChannelAnalytics>,
    pub agents: Arc<AgentService>,
    pub token: String,
    pub events: broadcast::Sender<AppEvent>,
}

impl AppState {
    /// Wires every store and client from `config` against one database.
    pub async fn build(db_path: &str, config: &Config, token: &str) -> Result<Self> {
        let source: Arc<dyn AnalyticsSource> = Arc::new(YouTubeAnalyticsClient::new(&config.youtube));
        Self::build_with_source(db_path, config, token, source).await
    }

    pub async fn build_with_source(
        db_path: &str,
        config: &Config,
        token: &str,
        source: Arc<dyn AnalyticsSource>,
    ) -> Result<Self> {
        let oauth = Arc::new(
            OAuthManager::new(
                db_path,
                config.oauth.clone(),
                config.daemon.refresh_margin_seconds,
            )
            .await?,
        );
        let cache = ReportCache::new(
            config.youtube.cache_capacity,
            Duration::from_secs(config.youtube.cache_ttl_seconds),
        );
        let analytics = Arc::new(ChannelAnalytics::new(source, oauth.clone(), cache));
        let router = Arc::new(ModelRouter::new(
            build_providers(&config.providers),
            config.agents.clone(),
        ));
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            cards: Arc::new(CardStore::new(db_path).await?),
            goals: Arc::new(GoalStore::new(db_path).await?),
            suggestions: Arc::new(SuggestionStore::new(db_path).await?),
            agents: Arc::new(AgentService::new(router, Some(analytics.clone()))),
            oauth,
            analytics,
            token: token.to_string(),
            events,
        })
    }

    fn emit(&self, event_type: &str, user_id: &str, entity: &str, entity_id: Option<i32>, payload: impl Serialize) {
        let payload = serde_json::to_value(payload).unwrap_or_default();
        publish(
            &self.events,
            AppEvent::new(event_type, user_id, entity, entity_id, payload),
        );
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    git_sha: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

#[derive(Deserialize)]
struct UserBody {
    user_id: String,
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CardListQuery {
    user_id: String,
    status: Option<CardStatus>,
    include_archived: Option<bool>,
}

#[derive(Deserialize)]
struct ChangesQuery {
    user_id: String,
    since: i64,
}

#[derive(Deserialize)]
struct MoveCardRequest {
    status: CardStatus,
    order_index: Option<usize>,
}

#[derive(Deserialize)]
struct ReorderRequest {
    status: CardStatus,
    ordered_ids: Vec<i32>,
}

#[derive(Deserialize)]
struct GoalListQuery {
    user_id: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ProgressRequest {
    current_value: f64,
}

#[derive(Deserialize)]
struct CompleteRequest {
    completed: Option<bool>,
}

#[derive(Deserialize)]
struct SuggestionListQuery {
    user_id: String,
    suggestion_type: Option<SuggestionType>,
    implemented: Option<bool>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    feedback: Feedback,
    note: Option<String>,
}

#[derive(Deserialize)]
struct ImplementedRequest {
    implemented: Option<bool>,
}

#[derive(Deserialize)]
struct DaysQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
struct EventStreamQuery {
    user_id: Option<String>,
}

#[derive(Serialize)]
struct AgentInfo {
    id: &'static str,
    name: &'static str,
    role: &'static str,
    primary: ModelConfig,
    fallback: Option<ModelConfig>,
    available: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/initiate", post(auth_initiate))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/status/{user_id}", get(auth_status))
        .route("/auth/refresh", post(auth_refresh))
        .route("/auth/revoke", post(auth_revoke))
        .route("/api/content-cards", get(list_cards).post(create_card))
        .route("/api/content-cards/board", get(card_board))
        .route("/api/content-cards/changes", get(card_changes))
        .route("/api/content-cards/reorder", post(reorder_cards))
        .route("/api/content-cards/{id}", get(get_card).patch(update_card))
        .route("/api/content-cards/{id}/move", post(move_card))
        .route("/api/content-cards/{id}/archive", post(archive_card))
        .route("/api/content-cards/{id}/restore", post(restore_card))
        .route("/api/goals", get(list_goals).post(create_goal))
        .route("/api/goals/sync", post(sync_goals))
        .route("/api/goals/{id}", get(get_goal).patch(update_goal))
        .route("/api/goals/{id}/progress", post(update_goal_progress))
        .route("/api/goals/{id}/complete", post(complete_goal))
        .route("/api/suggestions", get(list_suggestions).post(save_suggestion))
        .route(
            "/api/suggestions/{id}",
            axum::routing::delete(delete_suggestion),
        )
        .route("/api/suggestions/{id}/feedback", post(suggestion_feedback))
        .route("/api/suggestions/{id}/implemented", post(suggestion_implemented))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/chat", post(agent_chat))
        .route("/api/analytics/channel-health/{user_id}", get(channel_health))
        .route("/api/events", get(event_stream))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: crate::GIT_SHA.to_string(),
    })
}

fn error_response(err: CreatorPilotError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            message: err.user_message().to_string(),
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

fn require_user(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(CreatorPilotError::Validation("user_id is required".to_string()));
    }
    Ok(trimmed)
}

async fn auth_initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserBody>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.oauth.initiate(&payload.user_id).await)
}

/// Redirect target for the consent screen; carries no bearer token.
async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = query.error {
        // The pending session expires on its own and is swept by the refresh job.
        return error_response(CreatorPilotError::Forbidden(format!(
            "authorization was not granted: {error}"
        )));
    }
    let (Some(code), Some(state_token)) = (query.code, query.state) else {
        return error_response(CreatorPilotError::Validation(
            "callback requires code and state".to_string(),
        ));
    };
    let result = state.oauth.complete(&state_token, &code).await;
    if let Ok(status) = &result {
        state.emit("auth_connected", &status.user_id, "auth", None, status);
    }
    respond(result)
}

async fn auth_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.oauth.status(&user_id).await)
}

async fn auth_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserBody>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.oauth.refresh(&payload.user_id).await;
    if let Err(CreatorPilotError::Unauthorized(_)) = &result {
        state.analytics.forget_user(&payload.user_id).await;
    }
    respond(result)
}

async fn auth_revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserBody>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.oauth.revoke(&payload.user_id).await;
    if let Ok(status) = &result {
        state.analytics.forget_user(&payload.user_id).await;
        state.emit("auth_disconnected", &payload.user_id, "auth", None, status);
    }
    respond(result)
}

async fn list_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CardListQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let filter = CardFilter {
        status: query.status,
        include_archived: query.include_archived.unwrap_or(false),
    };
    respond(state.cards.list_cards(&query.user_id, filter).await)
}

async fn create_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
    Json(payload): Json<NewCard>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let user_id = match require_user(&query.user_id) {
        Ok(user_id) => user_id,
        Err(err) => return error_response(err),
    };
    let result = state.cards.create_card(user_id, payload).await;
    if let Ok(card) = &result {
        state.emit("card_created", user_id, "content_card", Some(card.id), card);
    }
    respond(result)
}

async fn card_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.cards.board(&query.user_id).await)
}

async fn card_changes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ChangesQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state
        .cards
        .changes_since(&query.user_id, query.since)
        .await
        .map(|cards| json!({ "cards": cards, "server_time": crate::db::now_ts() }));
    respond(result)
}

async fn get_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.cards.get_card(&query.user_id, id).await)
}

async fn update_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<CardPatch>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.cards.update_card(&query.user_id, id, payload).await;
    if let Ok(card) = &result {
        state.emit("card_updated", &query.user_id, "content_card", Some(id), card);
    }
    respond(result)
}

async fn move_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<MoveCardRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state
        .cards
        .move_card(&query.user_id, id, payload.status, payload.order_index)
        .await;
    if let Ok(card) = &result {
        state.emit("card_moved", &query.user_id, "content_card", Some(id), card);
    }
    respond(result)
}

async fn reorder_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
    Json(payload): Json<ReorderRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state
        .cards
        .reorder_column(&query.user_id, payload.status, &payload.ordered_ids)
        .await;
    if result.is_ok() {
        state.emit(
            "column_reordered",
            &query.user_id,
            "content_card",
            None,
            json!({ "status": payload.status, "ordered_ids": payload.ordered_ids }),
        );
    }
    respond(result)
}

async fn archive_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.cards.archive_card(&query.user_id, id).await;
    if let Ok(card) = &result {
        state.emit("card_archived", &query.user_id, "content_card", Some(id), card);
    }
    respond(result)
}

async fn restore_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.cards.restore_card(&query.user_id, id).await;
    if let Ok(card) = &result {
        state.emit("card_restored", &query.user_id, "content_card", Some(id), card);
    }
    respond(result)
}

async fn list_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GoalListQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let status = match GoalStatus::from_option(query.status.as_deref()) {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    respond(state.goals.list_goals(&query.user_id, status).await)
}

async fn create_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
    Json(payload): Json<NewGoal>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let user_id = match require_user(&query.user_id) {
        Ok(user_id) => user_id,
        Err(err) => return error_response(err),
    };
    let result = state.goals.create_goal(user_id, payload).await;
    if let Ok(goal) = &result {
        state.emit("goal_created", user_id, "goal", Some(goal.id), goal);
    }
    respond(result)
}

async fn get_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.goals.get_goal(&query.user_id, id).await)
}

async fn update_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<GoalPatch>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state.goals.update_goal(&query.user_id, id, payload).await;
    if let Ok(goal) = &result {
        state.emit("goal_updated", &query.user_id, "goal", Some(id), goal);
    }
    respond(result)
}

async fn update_goal_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<ProgressRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state
        .goals
        .update_progress(&query.user_id, id, payload.current_value)
        .await;
    if let Ok(goal) = &result {
        state.emit("goal_progress", &query.user_id, "goal", Some(id), goal);
    }
    respond(result)
}

async fn complete_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    payload: Option<Json<CompleteRequest>>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let completed = payload
        .and_then(|Json(body)| body.completed)
        .unwrap_or(true);
    let result = state.goals.set_completed(&query.user_id, id, completed).await;
    if let Ok(goal) = &result {
        state.emit("goal_updated", &query.user_id, "goal", Some(id), goal);
    }
    respond(result)
}

async fn sync_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let days = clamp_days(None);
    let snapshot = match state.analytics.snapshot(&query.user_id, days).await {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(err),
    };
    let result = state.goals.sync_goals(&query.user_id, &snapshot).await;
    if let Ok(goals) = &result {
        state.emit(
            "goals_synced",
            &query.user_id,
            "goal",
            None,
            json!({ "updated": goals.iter().map(|goal| goal.id).collect::<Vec<_>>() }),
        );
    }
    respond(result.map(|goals| json!({ "snapshot": snapshot, "updated": goals })))
}

async fn list_suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SuggestionListQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let filter = SuggestionFilter {
        suggestion_type: query.suggestion_type,
        implemented: query.implemented,
    };
    respond(
        state
            .suggestions
            .list_suggestions(&query.user_id, filter, query.limit.unwrap_or(100))
            .await,
    )
}

async fn save_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
    Json(payload): Json<NewSuggestion>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let user_id = match require_user(&query.user_id) {
        Ok(user_id) => user_id,
        Err(err) => return error_response(err),
    };
    let result = state.suggestions.save_suggestion(user_id, payload).await;
    if let Ok(saved) = &result {
        state.emit("suggestion_saved", user_id, "suggestion", Some(saved.id), saved);
    }
    respond(result)
}

async fn suggestion_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    Json(payload): Json<FeedbackRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let result = state
        .suggestions
        .record_feedback(&query.user_id, id, payload.feedback, payload.note.as_deref())
        .await;
    if let Ok(saved) = &result {
        state.emit("suggestion_updated", &query.user_id, "suggestion", Some(id), saved);
    }
    respond(result)
}

async fn suggestion_implemented(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
    payload: Option<Json<ImplementedRequest>>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let implemented = payload
        .and_then(|Json(body)| body.implemented)
        .unwrap_or(true);
    let result = state
        .suggestions
        .mark_implemented(&query.user_id, id, implemented)
        .await;
    if let Ok(saved) = &result {
        state.emit("suggestion_updated", &query.user_id, "suggestion", Some(id), saved);
    }
    respond(result)
}

async fn delete_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    match state.suggestions.delete_suggestion(&query.user_id, id).await {
        Ok(true) => {
            state.emit("suggestion_deleted", &query.user_id, "suggestion", Some(id), json!({}));
            respond(Ok(json!({ "deleted": true, "id": id })))
        }
        Ok(false) => error_response(CreatorPilotError::NotFound(format!("suggestion {id}"))),
        Err(err) => error_response(err),
    }
}

async fn list_agents(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let router = state.agents.router();
    let configured = router.configured_providers();
    let agents: Vec<AgentInfo> = state
        .agents
        .registry()
        .list()
        .iter()
        .map(|persona| {
            let plan = router.plan_for(persona.id);
            let available = configured.contains(&plan.primary.provider)
                || plan
                    .fallback
                    .as_ref()
                    .is_some_and(|fallback| configured.contains(&fallback.provider));
            AgentInfo {
                id: persona.id,
                name: persona.name,
                role: persona.role,
                primary: plan.primary,
                fallback: plan.fallback,
                available,
            }
        })
        .collect();
    (StatusCode::OK, Json(json!({ "agents": agents }))).into_response()
}

async fn agent_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    respond(state.agents.chat(payload).await)
}

async fn channel_health(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(query): Query<DaysQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let days = clamp_days(query.days);
    respond(state.analytics.channel_health(&user_id, days).await)
}

async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventStreamQuery>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let mut receiver = state.events.subscribe();
    let filter_user = query.user_id;

    let body = Body::from_stream(async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(filter) = &filter_user {
                        if event.user_id != *filter {
                            continue;
                        }
                    }
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    let line = format!("event: {}\ndata: {}\n\n", event.event_type, payload);
                    yield Ok::<Bytes, std::convert::Infallible>(Bytes::from(line));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    continue;
                }
                Err(_) => break,
            }
        }
    });

    (
        StatusCode::OK,
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn authorize(
    headers: &HeaderMap,
    token: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
                message: "Missing or invalid API token.".to_string(),
            }),
        )
    };

    let expected_token = token.trim();
    if expected_token.is_empty() {
        return Err(unauthorized());
    }

    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("").trim();
    let api_key = api_key.trim();

    if bearer == expected_token || api_key == expected_token {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

pub async fn run(host: &str, port: u16, db_path: &str, token: &str) -> Result<()> {
    run_with_shutdown(host, port, db_path, token, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(
    host: &str,
    port: u16,
    db_path: &str,
    token: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = config_store::load_or_init_async(db_path).await?;
    let config = tokio::task::spawn_blocking(move || config.resolve_secrets())
        .await
        .map_err(|e| CreatorPilotError::Runtime(e.to_string()))??;
    config.validate()?;
    if config.oauth.client_id.trim().is_empty() {
        tracing::warn!("YouTube OAuth client id is not configured; channel connect is disabled");
    }

    let state = AppState::build(db_path, &config, token).await?;

    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(TokenRefreshJob {
        oauth: state.oauth.clone(),
        interval: seconds(config.daemon.token_refresh_poll_seconds),
        margin_seconds: config.daemon.refresh_margin_seconds,
    }));
    scheduler.register_job(Arc::new(GoalSyncJob {
        oauth: state.oauth.clone(),
        analytics: state.analytics.clone(),
        goals: state.goals.clone(),
        events: state.events.clone(),
        interval: seconds(config.daemon.goal_sync_seconds),
        days: clamp_days(Some(config.daemon.goal_sync_days)),
    }));
    scheduler.start();

    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;
    tracing::info!(%addr, git_sha = crate::GIT_SHA, "creator-pilotd listening");
    let shutdown = async move {
        shutdown.await;
        scheduler.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;

    Ok(())
}
