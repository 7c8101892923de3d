//! Report moderation queue.
//!
//! Provides an abstraction for handing new reports to the moderation worker.
//! The actual implementation is provided by the queue crate.

use agora_common::AppResult;
use agora_db::entities::report;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for enqueueing report moderation jobs.
///
/// This allows the core services to schedule classification
/// without directly depending on the queue implementation.
#[async_trait]
pub trait ReportQueue: Send + Sync {
    /// Queue a report for automatic moderation.
    ///
    /// # Arguments
    /// * `report` - The persisted report; the job carries its full payload
    async fn enqueue(&self, report: &report::Model) -> AppResult<()>;
}

/// A no-op implementation of `ReportQueue` for testing or when the worker is disabled.
#[derive(Clone, Default)]
pub struct NoOpReportQueue;

#[async_trait]
impl ReportQueue for NoOpReportQueue {
    async fn enqueue(&self, _report: &report::Model) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `ReportQueue` trait object.
pub type ReportQueueService = Arc<dyn ReportQueue>;
