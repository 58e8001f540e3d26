use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CreatorPilotError, Result};
use crate::interfaces::analytics::AnalyticsSource;
use crate::oauth::OAuthManager;

mod client;

pub use client::{parse_report, YouTubeAnalyticsClient};

pub const DEFAULT_HEALTH_DAYS: u32 = 28;
pub const MAX_HEALTH_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub subscribers_gained: u64,
    pub subscribers_lost: u64,
    pub watch_minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub subscriber_count: Option<u64>,
    pub view_count: Option<u64>,
    pub video_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub days: u32,
    pub total_views: u64,
    pub avg_daily_views: f64,
    pub net_subscribers: i64,
    /// Likes plus comments per 100 views.
    pub engagement_rate: f64,
    pub watch_minutes: f64,
    /// Second half of the window against the first half.
    pub views_trend_percent: f64,
    pub score: u8,
    pub grade: char,
}

/// Point-in-time channel metrics that goal sync copies into goals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub subscribers: Option<f64>,
    pub views: Option<f64>,
    pub engagement_rate: Option<f64>,
}

impl ChannelSnapshot {
    pub fn from_parts(stats: &ChannelStatistics, health: Option<&ChannelHealth>) -> Self {
        Self {
            subscribers: stats.subscriber_count.map(|count| count as f64),
            views: stats.view_count.map(|count| count as f64),
            engagement_rate: health.map(|health| health.engagement_rate),
        }
    }
}

pub fn clamp_days(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_HEALTH_DAYS).clamp(1, MAX_HEALTH_DAYS)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarises daily rows into a 0-100 health score.
///
/// Weighting: engagement 40 (saturates at 5%), view trend 30 (-50%..+50%),
/// subscriber conversion 30 (saturates at 10 net subscribers per 1k views).
pub fn channel_health(rows: &[DailyMetrics], days: u32) -> ChannelHealth {
    let total_views: u64 = rows.iter().map(|row| row.views).sum();
    let interactions: u64 = rows.iter().map(|row| row.likes + row.comments).sum();
    let net_subscribers: i64 = rows
        .iter()
        .map(|row| row.subscribers_gained as i64 - row.subscribers_lost as i64)
        .sum();
    let watch_minutes: f64 = rows.iter().map(|row| row.watch_minutes).sum();
    let avg_daily_views = if rows.is_empty() {
        0.0
    } else {
        total_views as f64 / rows.len() as f64
    };
    let engagement_rate = if total_views == 0 {
        0.0
    } else {
        interactions as f64 / total_views as f64 * 100.0
    };

    let mid = rows.len() / 2;
    let first: u64 = rows[..mid].iter().map(|row| row.views).sum();
    let second: u64 = rows[mid..].iter().map(|row| row.views).sum();
    let views_trend_percent = if rows.len() < 2 {
        0.0
    } else {
        // Compare per-day averages; halves differ by one row on odd lengths.
        let first_avg = first as f64 / mid as f64;
        let second_avg = second as f64 / (rows.len() - mid) as f64;
        if first_avg == 0.0 {
            if second_avg > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (second_avg - first_avg) / first_avg * 100.0
        }
    };

    let engagement_points = (engagement_rate / 5.0).min(1.0) * 40.0;
    let trend_points = (views_trend_percent.clamp(-50.0, 50.0) + 50.0) / 100.0 * 30.0;
    let conversion_points = if total_views == 0 {
        0.0
    } else {
        let per_thousand = net_subscribers as f64 / (total_views as f64 / 1000.0);
        (per_thousand / 10.0).clamp(0.0, 1.0) * 30.0
    };
    let score = if rows.is_empty() {
        0
    } else {
        (engagement_points + trend_points + conversion_points)
            .round()
            .clamp(0.0, 100.0) as u8
    };

    ChannelHealth {
        days,
        total_views,
        avg_daily_views: round2(avg_daily_views),
        net_subscribers,
        engagement_rate: round2(engagement_rate),
        watch_minutes: round2(watch_minutes),
        views_trend_percent: round2(views_trend_percent),
        score,
        grade: grade_for(score),
    }
}

pub fn grade_for(score: u8) -> char {
    match score {
        85..=100 => 'A',
        70..=84 => 'B',
        55..=69 => 'C',
        40..=54 => 'D',
        _ => 'F',
    }
}

/// LRU of daily reports keyed by (user, days) with a fixed TTL.
pub struct ReportCache {
    inner: Mutex<LruCache<(String, u32), (Instant, Arc<Vec<DailyMetrics>>)>>,
    ttl: Duration,
}

impl ReportCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub async fn get(&self, user_id: &str, days: u32) -> Option<Arc<Vec<DailyMetrics>>> {
        let mut cache = self.inner.lock().await;
        let key = (user_id.to_string(), days);
        let fresh = cache
            .get(&key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, rows)| Arc::clone(rows));
        if fresh.is_none() {
            cache.pop(&key);
        }
        fresh
    }

    pub async fn put(&self, user_id: &str, days: u32, rows: Arc<Vec<DailyMetrics>>) {
        let mut cache = self.inner.lock().await;
        cache.put((user_id.to_string(), days), (Instant::now(), rows));
    }

    pub async fn invalidate_user(&self, user_id: &str) {
        let mut cache = self.inner.lock().await;
        let stale: Vec<(String, u32)> = cache
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }
}

/// Channel analytics for connected users: token handling, caching and the
/// health summary.
pub struct ChannelAnalytics {
    source: Arc<dyn AnalyticsSource>,
    oauth: Arc<OAuthManager>,
    cache: ReportCache,
}

impl ChannelAnalytics {
    pub fn new(source: Arc<dyn AnalyticsSource>, oauth: Arc<OAuthManager>, cache: ReportCache) -> Self {
        Self {
            source,
            oauth,
            cache,
        }
    }

    pub async fn daily_metrics(&self, user_id: &str, days: u32) -> Result<Arc<Vec<DailyMetrics>>> {
        if let Some(rows) = self.cache.get(user_id, days).await {
            debug!(user_id, days, "Analytics cache hit");
            return Ok(rows);
        }
        let token = self.oauth.access_token(user_id).await?;
        let rows = match self.source.daily_metrics(&token, days).await {
            Err(CreatorPilotError::Unauthorized(message)) => {
                warn!(user_id, "Analytics rejected token, retrying once: {}", message);
                let token = self.oauth.handle_unauthorized(user_id).await?;
                self.source.daily_metrics(&token, days).await?
            }
            other => other?,
        };
        let rows = Arc::new(rows);
        self.cache.put(user_id, days, Arc::clone(&rows)).await;
        Ok(rows)
    }

    pub async fn channel_health(&self, user_id: &str, days: u32) -> Result<ChannelHealth> {
        let rows = self.daily_metrics(user_id, days).await?;
        Ok(channel_health(&rows, days))
    }

    pub async fn snapshot(&self, user_id: &str, days: u32) -> Result<ChannelSnapshot> {
        let health = self.channel_health(user_id, days).await?;
        let token = self.oauth.access_token(user_id).await?;
        let stats = match self.source.channel_statistics(&token).await {
            Err(CreatorPilotError::Unauthorized(_)) => {
                let token = self.oauth.handle_unauthorized(user_id).await?;
                self.source.channel_statistics(&token).await?
            }
            other => other?,
        };
        Ok(ChannelSnapshot::from_parts(&stats, Some(&health)))
    }

    pub async fn forget_user(&self, user_id: &str) {
        self.cache.invalidate_user(user_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: &str, views: u64, likes: u64, comments: u64, gained: u64, lost: u64) -> DailyMetrics {
        DailyMetrics {
            date: date.to_string(),
            views,
            likes,
            comments,
            subscribers_gained: gained,
            subscribers_lost: lost,
            watch_minutes: views as f64 * 2.5,
        }
    }

    #[test]
    fn empty_report_scores_zero() {
        let health = channel_health(&[], 28);
        assert_eq!(health.score, 0);
        assert_eq!(health.grade, 'F');
        assert_eq!(health.total_views, 0);
        assert_eq!(health.days, 28);
    }

    #[test]
    fn growing_engaged_channel_scores_high() {
        let rows = vec![
            day("2026-10-01", 100, 5, 1, 1, 0),
            day("2026-10-02", 100, 5, 1, 1, 0),
            day("2026-10-03", 200, 10, 2, 2, 0),
            day("2026-10-04", 200, 10, 2, 2, 0),
        ];
        let health = channel_health(&rows, 4);
        assert_eq!(health.total_views, 600);
        assert_eq!(health.avg_daily_views, 150.0);
        assert_eq!(health.net_subscribers, 6);
        assert_eq!(health.engagement_rate, 6.0);
        assert_eq!(health.views_trend_percent, 100.0);
        assert_eq!(health.watch_minutes, 1500.0);
        // 40 engagement + 30 trend + 30 * (10 per 1k / 10) = 100
        assert_eq!(health.score, 100);
        assert_eq!(health.grade, 'A');
    }

    #[test]
    fn declining_channel_loses_trend_points() {
        let rows = vec![
            day("2026-10-01", 400, 4, 0, 0, 1),
            day("2026-10-02", 100, 1, 0, 0, 1),
        ];
        let health = channel_health(&rows, 2);
        assert_eq!(health.views_trend_percent, -75.0);
        assert_eq!(health.net_subscribers, -2);
        // 1% engagement -> 8 points, trend floor -> 0, negative conversion -> 0
        assert_eq!(health.score, 8);
        assert_eq!(health.grade, 'F');
    }

    #[test]
    fn days_are_clamped() {
        assert_eq!(clamp_days(None), 28);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(1000)), 365);
    }

    #[tokio::test]
    async fn cache_expires_and_invalidates() {
        let cache = ReportCache::new(4, Duration::from_secs(60));
        let rows = Arc::new(vec![day("2026-10-01", 1, 0, 0, 0, 0)]);
        cache.put("u1", 28, Arc::clone(&rows)).await;
        assert!(cache.get("u1", 28).await.is_some());
        assert!(cache.get("u1", 7).await.is_none());
        cache.invalidate_user("u1").await;
        assert!(cache.get("u1", 28).await.is_none());

        let stale = ReportCache::new(4, Duration::ZERO);
        stale.put("u1", 28, rows).await;
        assert!(stale.get("u1", 28).await.is_none());
    }
}
