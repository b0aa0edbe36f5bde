use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::Store;

const SWEEP_JOB: &str = "sweep_refresh_tokens";

pub struct Scheduler {
    store: Store,
    config: SchedulerConfig,
    inner: Option<JobScheduler>,
}

impl Scheduler {
    #[must_use]
    pub const fn new(store: Store, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            inner: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        let sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let job = Job::new_async(self.config.refresh_token_sweep_cron.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                let start = std::time::Instant::now();
                info!(event = "job_started", job_name = SWEEP_JOB, "Sweeping expired refresh tokens");

                match sweep_refresh_tokens(&store).await {
                    Ok(deleted) => info!(
                        event = "job_finished",
                        job_name = SWEEP_JOB,
                        deleted,
                        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Refresh token sweep finished"
                    ),
                    Err(e) => error!(
                        event = "job_failed",
                        job_name = SWEEP_JOB,
                        error = %e,
                        "Refresh token sweep failed"
                    ),
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!(
            "Refresh token sweep scheduled: {}",
            self.config.refresh_token_sweep_cron
        );
        self.inner = Some(sched);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut sched) = self.inner.take() {
            info!("Stopping scheduler...");
            sched.shutdown().await?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.inner.is_some()
    }
}

/// Deletes refresh tokens past their expiry. Returns how many were removed.
pub async fn sweep_refresh_tokens(store: &Store) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    store.delete_expired_refresh_tokens(now).await
}
