//! Scheduled jobs for periodic moderation maintenance.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use agora_common::{AppResult, config::ModerationConfig};
use agora_core::ModerationService;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Re-enqueue reports left in PENDING.
    RequeueStaleReports { older_than: Duration, limit: u64 },
    /// Lift suspensions whose bans have all expired.
    ReleaseExpiredSuspensions,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for the stale report sweep (default: 5 minutes).
    pub requeue_interval: Duration,
    /// Age after which a pending report counts as stale (default: 10 minutes).
    pub requeue_after: Duration,
    /// Reports requeued per sweep.
    pub requeue_batch: u64,
    /// Interval for the suspension sweep (default: 1 minute).
    pub suspension_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&ModerationConfig::default())
    }
}

impl From<&ModerationConfig> for SchedulerConfig {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            requeue_interval: Duration::from_secs(config.requeue_interval_secs),
            requeue_after: Duration::from_secs(config.requeue_after_secs),
            requeue_batch: 100,
            suspension_sweep_interval: Duration::from_secs(config.suspension_sweep_interval_secs),
        }
    }
}

/// Executor for scheduled maintenance jobs.
#[async_trait::async_trait]
pub trait MaintenanceExecutor: Send + Sync {
    /// Re-enqueue stale pending reports.
    async fn requeue_stale_reports(&self, older_than: Duration, limit: u64) -> AppResult<usize>;

    /// Return users with expired suspensions to ACTIVE.
    async fn release_expired_suspensions(&self) -> AppResult<usize>;
}

#[async_trait::async_trait]
impl MaintenanceExecutor for ModerationService {
    async fn requeue_stale_reports(&self, older_than: Duration, limit: u64) -> AppResult<usize> {
        Self::requeue_stale_reports(self, older_than, limit).await
    }

    async fn release_expired_suspensions(&self) -> AppResult<usize> {
        Ok(Self::release_expired_suspensions(self).await?.len())
    }
}

/// Run one scheduled job. Errors are logged, not returned.
pub async fn run_job<E: MaintenanceExecutor + ?Sized>(executor: &E, job: ScheduledJob) -> usize {
    match job {
        ScheduledJob::RequeueStaleReports { older_than, limit } => {
            match executor.requeue_stale_reports(older_than, limit).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Requeued stale reports");
                    }
                    count
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to requeue stale reports");
                    0
                }
            }
        }
        ScheduledJob::ReleaseExpiredSuspensions => {
            match executor.release_expired_suspensions().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Released expired suspensions");
                    }
                    count
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to release expired suspensions");
                    0
                }
            }
        }
    }
}

fn spawn_every<E: MaintenanceExecutor + ?Sized + 'static>(
    every: Duration,
    executor: Arc<E>,
    job: ScheduledJob,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(every);
        loop {
            interval.tick().await;
            run_job(executor.as_ref(), job).await;
        }
    })
}

/// Run the scheduler with the given configuration and executor.
///
/// Returns the spawned task handles so the caller can abort them on shutdown.
pub fn run_scheduler<E: MaintenanceExecutor + ?Sized + 'static>(
    config: &SchedulerConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_every(
            config.requeue_interval,
            executor.clone(),
            ScheduledJob::RequeueStaleReports {
                older_than: config.requeue_after,
                limit: config.requeue_batch,
            },
        ),
        spawn_every(
            config.suspension_sweep_interval,
            executor,
            ScheduledJob::ReleaseExpiredSuspensions,
        ),
    ]
}
