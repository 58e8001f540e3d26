use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use creator_pilot::config::{Config, OAuthConfig};
use creator_pilot::daemon::{build_router, AppState};
use creator_pilot::error::{CreatorPilotError, Result};
use creator_pilot::interfaces::analytics::AnalyticsSource;
use creator_pilot::youtube::{ChannelStatistics, DailyMetrics};

const TOKEN: &str = "token";

struct FakeChannel;

#[async_trait]
impl AnalyticsSource for FakeChannel {
    async fn daily_metrics(&self, access_token: &str, days: u32) -> Result<Vec<DailyMetrics>> {
        if access_token != "at-1" {
            return Err(CreatorPilotError::Unauthorized("bad token".to_string()));
        }
        Ok((1..=days.min(4))
            .map(|day| DailyMetrics {
                date: format!("2026-10-0{day}"),
                views: 1000,
                likes: 40,
                comments: 10,
                subscribers_gained: 12,
                subscribers_lost: 2,
                watch_minutes: 2500.0,
            })
            .collect())
    }

    async fn channel_statistics(&self, access_token: &str) -> Result<ChannelStatistics> {
        if access_token != "at-1" {
            return Err(CreatorPilotError::Unauthorized("bad token".to_string()));
        }
        Ok(ChannelStatistics {
            subscriber_count: Some(1500),
            view_count: Some(80_000),
            video_count: Some(42),
        })
    }
}

async fn test_state(server: &MockServer, db_path: &str) -> AppState {
    let config = Config {
        oauth: OAuthConfig {
            client_id: "client-123".to_string(),
            token_url: server.url("/token"),
            revoke_url: server.url("/revoke"),
            ..OAuthConfig::default()
        },
        ..Config::default()
    };
    AppState::build_with_source(db_path, &config, TOKEN, Arc::new(FakeChannel))
        .await
        .unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open_and_api_requires_token() {
    let server = MockServer::start_async().await;
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("daemon.db").to_string_lossy().to_string();
    let app = build_router(test_state(&server, &db_path).await);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/content-cards?user_id=u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/agents")
                .header("x-api-key", TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["agents"].as_array().unwrap().len(), 5);
    assert_eq!(body["agents"][0]["id"], "boss");
    assert_eq!(body["agents"][0]["available"], false);
}

#[tokio::test]
async fn board_workflow_over_http_publishes_events() {
    let server = MockServer::start_async().await;
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("daemon.db").to_string_lossy().to_string();
    let state = test_state(&server, &db_path).await;
    let mut events = state.events.subscribe();
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/content-cards?user_id=u1",
            Some(json!({"title": "Desk setup tour", "pillars": [{"name": "Gear"}]})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let card = json_body(response).await;
    assert_eq!(card["status"], "ideas");
    assert_eq!(card["pillars"][0]["id"], "gear");
    let id = card["id"].as_i64().unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, "card_created");
    assert_eq!(event.user_id, "u1");

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/content-cards/{id}/move?user_id=u1"),
            Some(json!({"status": "inProgress"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "inProgress");
    assert_eq!(events.recv().await.unwrap().event_type, "card_moved");

    let response = app
        .clone()
        .oneshot(request("GET", "/api/content-cards/board?user_id=u1", None))
        .await
        .unwrap();
    let board = json_body(response).await;
    assert_eq!(board[2]["status"], "inProgress");
    assert_eq!(board[2]["cards"][0]["id"].as_i64(), Some(id));

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/content-cards/{id}?user_id=someone-else"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("couldn't find"));

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/content-cards?user_id=u1",
            Some(json!({"title": "   "})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/goals?user_id=u1&status=complete", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_channel_then_health_and_goal_sync() {
    let server = MockServer::start_async().await;
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("daemon.db").to_string_lossy().to_string();
    let app = build_router(test_state(&server, &db_path).await);

    let response = app
        .clone()
        .oneshot(request("GET", "/auth/status/u1", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["authenticated"], false);

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/api/analytics/channel-health/u1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(request("POST", "/auth/initiate", Some(json!({"user_id": "u1"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let initiated = json_body(response).await;
    let state_token = initiated["state"].as_str().unwrap().to_string();

    let token_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/token").body_includes("code=abc");
            then.status(200).json_body(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "scope": "https://www.googleapis.com/auth/yt-analytics.readonly"
            }));
        })
        .await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/callback?code=abc&state={state_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["authenticated"], true);
    token_mock.assert_calls_async(1).await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/api/analytics/channel-health/u1?days=7",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["days"], 7);
    assert_eq!(health["total_views"], 4000);
    assert_eq!(health["net_subscribers"], 40);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/goals?user_id=u1",
            Some(json!({"title": "1k subs", "goal_type": "subscribers", "target_value": 1000.0})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request("POST", "/api/goals/sync?user_id=u1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let synced = json_body(response).await;
    assert_eq!(synced["updated"][0]["completed"], true);
    assert_eq!(synced["snapshot"]["subscribers"], 1500.0);

    server
        .mock_async(|when, then| {
            when.method(POST).path("/revoke");
            then.status(200);
        })
        .await;
    let response = app
        .clone()
        .oneshot(request("POST", "/auth/revoke", Some(json!({"user_id": "u1"}))))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["authenticated"], false);
}

#[tokio::test]
async fn callback_rejects_denied_and_unknown_states() {
    let server = MockServer::start_async().await;
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("daemon.db").to_string_lossy().to_string();
    let app = build_router(test_state(&server, &db_path).await);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/callback?error=access_denied&state=whatever")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=abc&state=never-issued")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
