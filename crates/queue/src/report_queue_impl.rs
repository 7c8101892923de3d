//! Redis-backed report moderation queue.
//!
//! Pushes [`ReportModerationJob`]s onto the apalis Redis storage that the
//! `report-moderation` worker consumes.

use agora_common::{AppError, AppResult};
use agora_core::ReportQueue;
use agora_db::entities::report;
use async_trait::async_trait;

use crate::dead_letter::ModerationJobSink;
use crate::jobs::ReportModerationJob;

/// Redis-backed report queue.
#[derive(Clone)]
pub struct RedisReportQueue {
    /// Redis storage for job queue (apalis-redis).
    storage: apalis_redis::RedisStorage<ReportModerationJob>,
}

impl RedisReportQueue {
    /// Create a new Redis report queue.
    #[must_use]
    pub const fn new(storage: apalis_redis::RedisStorage<ReportModerationJob>) -> Self {
        Self { storage }
    }

    async fn push(&self, job: ReportModerationJob) -> AppResult<()> {
        use apalis::prelude::*;

        let report_id = job.report_id().to_string();
        self.storage
            .clone()
            .push(job)
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue job: {e}")))?;

        tracing::debug!(report_id = %report_id, "Queued report moderation job");
        Ok(())
    }
}

#[async_trait]
impl ReportQueue for RedisReportQueue {
    async fn enqueue(&self, report: &report::Model) -> AppResult<()> {
        tracing::info!(
            report_id = %report.id,
            target_type = %report.target_type,
            "Queueing report for moderation"
        );

        self.push(ReportModerationJob::from_report(report)).await
    }
}

#[async_trait]
impl ModerationJobSink for RedisReportQueue {
    async fn push_job(&self, job: ReportModerationJob) -> AppResult<()> {
        self.push(job).await
    }
}
