//! Job workers.

mod report_moderation;

pub use report_moderation::{ModerationWorkerContext, handle_report_job, report_moderation_worker};
