use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::interfaces::scheduler::ScheduledJob;

mod jobs;

pub use jobs::{GoalSyncJob, TokenRefreshJob};

pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            stop: None,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    pub fn start(&mut self) {
        if self.stop.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        self.stop = Some(tx);

        for job in &self.jobs {
            let job = Arc::clone(job);
            let first = if job.run_on_start() {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + job.interval()
            };
            let mut tick = tokio::time::interval_at(first, job.interval());
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut rx = rx.clone();
            debug!(
                job = job.name(),
                interval_secs = job.interval().as_secs(),
                run_on_start = job.run_on_start(),
                "Scheduling job"
            );
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(err) = job.run().await {
                                warn!(job = job.name(), "Scheduled job failed: {}", err);
                            }
                        }
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
            self.handles.push(handle);
        }
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(true);
        }
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Job interval from a config value; zero is treated as one second.
pub fn seconds(n: u64) -> Duration {
    Duration::from_secs(n.max(1))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{CreatorPilotError, Result};

    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<()> {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst);
            if runs == 1 {
                return Err(CreatorPilotError::Runtime("transient".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_run_does_not_stop_the_job() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
        });
        let mut scheduler = Scheduler::new();
        scheduler.register_job(job.clone());
        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(job.runs.load(Ordering::SeqCst) >= 3);
    }

    struct DeferredJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for DeferredJob {
        fn name(&self) -> &str {
            "deferred"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(3600)
        }

        fn run_on_start(&self) -> bool {
            false
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deferred_job_waits_a_full_interval() {
        let job = Arc::new(DeferredJob {
            runs: AtomicUsize::new(0),
        });
        let mut scheduler = Scheduler::new();
        scheduler.register_job(job.clone());
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_interval_is_clamped() {
        assert_eq!(seconds(0), Duration::from_secs(1));
    }
}
