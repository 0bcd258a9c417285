use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::RefreshJob;
use crate::config::IndexerConfig;
use crate::errors::{AppError, AppResult};

/// Drives [`RefreshJob`] from a cron schedule
pub struct IndexScheduler {
    job: Arc<RefreshJob>,
    schedule: Schedule,
    cron_expression: String,
    chain_ids: Vec<u64>,
    run_on_startup: bool,
}

impl IndexScheduler {
    pub fn new(job: Arc<RefreshJob>, config: &IndexerConfig) -> AppResult<Self> {
        let schedule = Schedule::from_str(&config.schedule).map_err(|e| {
            AppError::configuration(format!(
                "Invalid indexer schedule '{}': {}",
                config.schedule, e
            ))
        })?;

        Ok(Self {
            job,
            schedule,
            cron_expression: config.schedule.clone(),
            chain_ids: config.supported_chain_ids.clone(),
            run_on_startup: config.run_on_startup,
        })
    }

    /// First scheduled run strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Run forever; the caller aborts the task on shutdown
    pub async fn start(self) {
        info!(
            "Starting index scheduler for chains {:?} (cron: {})",
            self.chain_ids, self.cron_expression
        );
        if self.chain_ids.is_empty() {
            warn!("No supported chain ids configured; cycles will only refresh the registry");
        }

        if self.run_on_startup {
            self.run_once().await;
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.next_run_after(now) else {
                warn!("Schedule '{}' has no upcoming runs, stopping", self.cron_expression);
                return;
            };
            info!("Next refresh cycle at {}", next.format("%Y-%m-%d %H:%M:%S UTC"));

            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            self.run_once().await;
        }
    }

    async fn run_once(&self) {
        match self.job.run_cycle(&self.chain_ids).await {
            Ok(Some(report)) => debug!(
                "Cycle report: {} platforms, {} logos",
                report.platforms,
                report.indexed_logos()
            ),
            Ok(None) => debug!("Cycle skipped"),
            Err(e) => error!("Refresh cycle failed: {}", e),
        }
    }
}
