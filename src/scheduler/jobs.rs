use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::Result;
use crate::goals::GoalStore;
use crate::interfaces::scheduler::ScheduledJob;
use crate::oauth::OAuthManager;
use crate::services::events::{publish, AppEvent};
use crate::youtube::ChannelAnalytics;

/// Keeps stored grants fresh and sweeps abandoned consent sessions.
pub struct TokenRefreshJob {
    pub oauth: Arc<OAuthManager>,
    pub interval: Duration,
    pub margin_seconds: i64,
}

#[async_trait]
impl ScheduledJob for TokenRefreshJob {
    fn name(&self) -> &str {
        "token_refresh"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        // Look one poll ahead so nothing expires between runs.
        let window = self.margin_seconds + self.interval.as_secs() as i64;
        let refreshed = self.oauth.refresh_expiring(window).await?;
        let purged = self.oauth.purge_expired_sessions().await?;
        if refreshed > 0 || purged > 0 {
            info!(refreshed, purged, "Token maintenance finished");
        }
        Ok(())
    }
}

/// Pulls channel counters for every connected user into their tracked goals.
pub struct GoalSyncJob {
    pub oauth: Arc<OAuthManager>,
    pub analytics: Arc<ChannelAnalytics>,
    pub goals: Arc<GoalStore>,
    pub events: broadcast::Sender<AppEvent>,
    pub interval: Duration,
    pub days: u32,
}

#[async_trait]
impl ScheduledJob for GoalSyncJob {
    fn name(&self) -> &str {
        "goal_sync"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_on_start(&self) -> bool {
        false
    }

    async fn run(&self) -> Result<()> {
        for user_id in self.oauth.connected_users().await? {
            let snapshot = match self.analytics.snapshot(&user_id, self.days).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(user_id = %user_id, "Goal sync skipped: {}", err);
                    continue;
                }
            };
            let updated = match self.goals.sync_goals(&user_id, &snapshot).await {
                Ok(updated) => updated,
                Err(err) => {
                    warn!(user_id = %user_id, "Goal sync failed: {}", err);
                    continue;
                }
            };
            if updated.is_empty() {
                continue;
            }
            publish(
                &self.events,
                AppEvent::new(
                    "goals_synced",
                    &user_id,
                    "goal",
                    None,
                    json!({
                        "updated": updated.iter().map(|goal| goal.id).collect::<Vec<_>>(),
                        "completed": updated
                            .iter()
                            .filter(|goal| goal.completed)
                            .map(|goal| goal.id)
                            .collect::<Vec<_>>(),
                    }),
                ),
            );
        }
        Ok(())
    }
}
