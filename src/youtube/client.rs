use async_trait::async_trait;
use chrono::{Days, Utc};
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::YouTubeConfig;
use crate::error::{CreatorPilotError, Result};
use crate::interfaces::analytics::AnalyticsSource;

use super::{ChannelStatistics, DailyMetrics};

const REPORT_METRICS: &str =
    "views,likes,comments,subscribersGained,subscribersLost,estimatedMinutesWatched";

/// Reads the YouTube Analytics `reports` endpoint and the Data API
/// `channels` resource for the authorized channel.
#[derive(Clone)]
pub struct YouTubeAnalyticsClient {
    http: reqwest::Client,
    analytics_base_url: String,
    data_base_url: String,
}

impl YouTubeAnalyticsClient {
    pub fn new(config: &YouTubeConfig) -> Self {
        Self {
            http: crate::providers::http_client(),
            analytics_base_url: config.analytics_base_url.trim_end_matches('/').to_string(),
            data_base_url: config.data_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, url: &str, access_token: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("youtube request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("youtube response read failed: {e}")))?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| CreatorPilotError::Serialization(format!("youtube response: {e}")))
    }
}

#[async_trait]
impl AnalyticsSource for YouTubeAnalyticsClient {
    async fn daily_metrics(&self, access_token: &str, days: u32) -> Result<Vec<DailyMetrics>> {
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_days(Days::new(u64::from(days.max(1) - 1)))
            .unwrap_or(end);
        let url = format!("{}/reports", self.analytics_base_url);
        let report = self
            .get_json(
                &url,
                access_token,
                &[
                    ("ids", "channel==MINE".to_string()),
                    ("startDate", start.format("%Y-%m-%d").to_string()),
                    ("endDate", end.format("%Y-%m-%d").to_string()),
                    ("metrics", REPORT_METRICS.to_string()),
                    ("dimensions", "day".to_string()),
                    ("sort", "day".to_string()),
                ],
            )
            .await?;
        parse_report(&report)
    }

    async fn channel_statistics(&self, access_token: &str) -> Result<ChannelStatistics> {
        let url = format!("{}/channels", self.data_base_url);
        let value = self
            .get_json(
                &url,
                access_token,
                &[("part", "statistics".to_string()), ("mine", "true".to_string())],
            )
            .await?;
        let stats = value
            .get("items")
            .and_then(|items| items.get(0))
            .and_then(|item| item.get("statistics"))
            .ok_or_else(|| CreatorPilotError::NotFound("no channel for this account".to_string()))?;
        // The Data API encodes counters as strings.
        let counter = |field: &str| {
            stats.get(field).and_then(|value| match value {
                Value::String(text) => text.parse::<u64>().ok(),
                other => other.as_u64(),
            })
        };
        Ok(ChannelStatistics {
            subscriber_count: counter("subscriberCount"),
            view_count: counter("viewCount"),
            video_count: counter("videoCount"),
        })
    }
}

/// Maps a `reports` payload onto per-day rows using its column headers.
pub fn parse_report(report: &Value) -> Result<Vec<DailyMetrics>> {
    let headers: Vec<&str> = report
        .get("columnHeaders")
        .and_then(|value| value.as_array())
        .map(|columns| {
            columns
                .iter()
                .map(|column| column.get("name").and_then(|name| name.as_str()).unwrap_or(""))
                .collect()
        })
        .unwrap_or_default();
    let column = |name: &str| headers.iter().position(|header| *header == name);
    let Some(day_idx) = column("day") else {
        return Err(CreatorPilotError::Serialization(
            "analytics report has no day column".to_string(),
        ));
    };
    let views_idx = column("views");
    let likes_idx = column("likes");
    let comments_idx = column("comments");
    let gained_idx = column("subscribersGained");
    let lost_idx = column("subscribersLost");
    let minutes_idx = column("estimatedMinutesWatched");

    let rows = report
        .get("rows")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    let mut metrics = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let number = |idx: Option<usize>| {
            idx.and_then(|idx| cells.get(idx))
                .and_then(|cell| cell.as_f64())
                .unwrap_or(0.0)
        };
        let Some(date) = cells.get(day_idx).and_then(|cell| cell.as_str()) else {
            continue;
        };
        metrics.push(DailyMetrics {
            date: date.to_string(),
            views: number(views_idx).max(0.0) as u64,
            likes: number(likes_idx).max(0.0) as u64,
            comments: number(comments_idx).max(0.0) as u64,
            subscribers_gained: number(gained_idx).max(0.0) as u64,
            subscribers_lost: number(lost_idx).max(0.0) as u64,
            watch_minutes: number(minutes_idx).max(0.0),
        });
    }
    metrics.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(metrics)
}

fn api_error(status: StatusCode, body: &str) -> CreatorPilotError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect());
    let message = format!("youtube api {status}: {message}");
    match status {
        StatusCode::UNAUTHORIZED => CreatorPilotError::Unauthorized(message),
        StatusCode::FORBIDDEN => CreatorPilotError::Forbidden(message),
        StatusCode::NOT_FOUND => CreatorPilotError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => CreatorPilotError::RateLimited(message),
        _ => CreatorPilotError::Http(message),
    }
}
