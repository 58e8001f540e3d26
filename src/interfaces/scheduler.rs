use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Periodic background work driven by [`crate::scheduler::Scheduler`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;

    /// Whether the first run happens at startup or one interval later.
    fn run_on_start(&self) -> bool {
        true
    }

    async fn run(&self) -> Result<()>;
}
