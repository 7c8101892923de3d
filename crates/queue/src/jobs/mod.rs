//! Job definitions.

#![allow(missing_docs)]

mod report_moderation;

pub use report_moderation::{REPORT_MODERATION_QUEUE, ReportJobPayload, ReportModerationJob};
