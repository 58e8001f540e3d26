use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::broadcast;

use creator_pilot::config::OAuthConfig;
use creator_pilot::error::Result;
use creator_pilot::goals::{GoalStatus, GoalStore, GoalType, NewGoal};
use creator_pilot::interfaces::analytics::AnalyticsSource;
use creator_pilot::interfaces::scheduler::ScheduledJob;
use creator_pilot::oauth::OAuthManager;
use creator_pilot::scheduler::GoalSyncJob;
use creator_pilot::youtube::{ChannelAnalytics, ChannelStatistics, DailyMetrics, ReportCache};

struct SteadyChannel;

#[async_trait]
impl AnalyticsSource for SteadyChannel {
    async fn daily_metrics(&self, _access_token: &str, days: u32) -> Result<Vec<DailyMetrics>> {
        Ok((1..=days.min(3))
            .map(|day| DailyMetrics {
                date: format!("2026-10-0{day}"),
                views: 500,
                likes: 20,
                comments: 5,
                subscribers_gained: 6,
                subscribers_lost: 1,
                watch_minutes: 900.0,
            })
            .collect())
    }

    async fn channel_statistics(&self, _access_token: &str) -> Result<ChannelStatistics> {
        Ok(ChannelStatistics {
            subscriber_count: Some(2400),
            view_count: Some(120_000),
            video_count: Some(60),
        })
    }
}

async fn connect(manager: &OAuthManager, server: &MockServer, user_id: &str) {
    let request = manager.initiate(user_id).await.unwrap();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600
            }));
        })
        .await;
    manager.complete(&request.state, "code").await.unwrap();
    mock.delete_async().await;
}

#[tokio::test]
async fn one_broken_user_does_not_stop_the_others() {
    let server = MockServer::start_async().await;
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("sync.db").to_string_lossy().to_string();
    let oauth = Arc::new(
        OAuthManager::new(
            &db_path,
            OAuthConfig {
                client_id: "client-123".to_string(),
                token_url: server.url("/token"),
                revoke_url: server.url("/revoke"),
                ..OAuthConfig::default()
            },
            600,
        )
        .await
        .unwrap(),
    );
    connect(&oauth, &server, "u1").await;
    connect(&oauth, &server, "u2").await;

    let goals = Arc::new(GoalStore::new(&db_path).await.unwrap());
    let target = goals
        .create_goal(
            "u2",
            NewGoal {
                title: "2k subs".to_string(),
                goal_type: GoalType::Subscribers,
                target_value: 2000.0,
                current_value: None,
                target_date: None,
            },
        )
        .await
        .unwrap();

    // u1 sorts first and holds a row its goal list cannot decode.
    let mut raw = creator_pilot::db::open_connection_sync(&db_path).unwrap();
    raw.batch_execute(
        "PRAGMA ignore_check_constraints = ON;
         INSERT INTO goals (user_id, title, goal_type, target_value, current_value, completed, created_at, updated_at)
         VALUES ('u1', 'broken', 'bogus', 10, 0, 0, 0, 0);",
    )
    .unwrap();
    drop(raw);

    let analytics = Arc::new(ChannelAnalytics::new(
        Arc::new(SteadyChannel),
        oauth.clone(),
        ReportCache::new(8, Duration::from_secs(60)),
    ));
    let (events, mut rx) = broadcast::channel(16);
    let job = GoalSyncJob {
        oauth,
        analytics,
        goals: goals.clone(),
        events,
        interval: Duration::from_secs(3600),
        days: 7,
    };

    job.run().await.unwrap();

    let synced = goals.get_goal("u2", target.id).await.unwrap();
    assert!(synced.completed);
    assert_eq!(synced.current_value, 2400.0);
    assert!(synced.last_synced_at.is_some());
    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, "goals_synced");
    assert_eq!(event.user_id, "u2");
    assert!(goals.list_goals("u1", GoalStatus::All).await.is_err());
}
