//! Report moderation worker.

use agora_common::{AppError, AppResult};
use agora_core::{ModerationService, ProcessOutcome};
use apalis::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dead_letter::DeadLetterSet;
use crate::jobs::ReportModerationJob;

/// Context for the report moderation worker.
#[derive(Clone)]
pub struct ModerationWorkerContext {
    pub service: Arc<ModerationService>,
    pub dead_letters: Arc<dyn DeadLetterSet>,
}

impl ModerationWorkerContext {
    /// Create a new worker context.
    #[must_use]
    pub fn new(service: Arc<ModerationService>, dead_letters: Arc<dyn DeadLetterSet>) -> Self {
        Self {
            service,
            dead_letters,
        }
    }
}

/// Worker function for moderating reports.
///
/// # Errors
/// Returns an error if the job payload is invalid or settling the report fails.
pub async fn report_moderation_worker(
    job: ReportModerationJob,
    ctx: Data<ModerationWorkerContext>,
) -> Result<(), Error> {
    match handle_report_job(&job, &ctx).await {
        Ok(_) => Ok(()),
        Err(e @ AppError::Validation(_)) => Err(Error::Abort(Arc::new(Box::new(e)))),
        Err(e) => Err(Error::Failed(Arc::new(Box::new(e)))),
    }
}

/// Validate, process and book-keep one job.
///
/// Failures are logged with the report id and recorded in the dead-letter set.
pub async fn handle_report_job(
    job: &ReportModerationJob,
    ctx: &ModerationWorkerContext,
) -> AppResult<ProcessOutcome> {
    let report_id = job.report_id();

    if let Err(e) = job.validate() {
        error!(report_id = %report_id, error = %e, "Rejected malformed moderation job");
        dead_letter(job, ctx, &e).await;
        return Err(e);
    }

    debug!(
        report_id = %report_id,
        target_type = %job.target_type(),
        "Moderating report"
    );

    match ctx
        .service
        .process_report_as(report_id, Some(job.target_type()))
        .await
    {
        Ok(outcome) => {
            if let ProcessOutcome::Settled { decision, .. } = &outcome {
                info!(report_id = %report_id, decision = %decision, "Moderation job completed");
            }
            match ctx.dead_letters.clear(report_id).await {
                Ok(true) => info!(report_id = %report_id, "Cleared dead letter after success"),
                Ok(false) => {}
                Err(e) => warn!(report_id = %report_id, error = %e, "Failed to clear dead letter"),
            }
            Ok(outcome)
        }
        Err(e) => {
            error!(report_id = %report_id, error = %e, "Moderation job failed");
            dead_letter(job, ctx, &e).await;
            Err(e)
        }
    }
}

async fn dead_letter(job: &ReportModerationJob, ctx: &ModerationWorkerContext, error: &AppError) {
    match ctx.dead_letters.record(job, &error.to_string()).await {
        Ok(entry) => warn!(
            report_id = %job.report_id(),
            attempts = entry.attempts,
            "Moderation job dead-lettered"
        ),
        Err(e) => error!(
            report_id = %job.report_id(),
            error = %e,
            "Failed to record dead letter"
        ),
    }
}
