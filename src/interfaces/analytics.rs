use async_trait::async_trait;

use crate::error::Result;
use crate::youtube::{ChannelStatistics, DailyMetrics};

#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// Per-day channel metrics for the trailing `days` days, oldest first.
    async fn daily_metrics(&self, access_token: &str, days: u32) -> Result<Vec<DailyMetrics>>;

    /// Lifetime channel counters.
    async fn channel_statistics(&self, access_token: &str) -> Result<ChannelStatistics>;
}
