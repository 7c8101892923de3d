//! Business logic services.

#![allow(missing_docs)]

pub mod classifier;
pub mod content_snapshot;
pub mod event_publisher;
pub mod moderation;
pub mod point_limiter;
pub mod report_queue;
pub mod scoring;

pub use classifier::{
    AiModerator, ClassifierVerdict, ContentClassifier, FixedClassifier, ModerationScores,
    OpenAiModerationClient, UnconfiguredClassifier,
};
pub use content_snapshot::{ContentSnapshot, ContentSnapshotReader};
pub use event_publisher::{
    BanUserPayload, EventPublisher, EventPublisherService, ModerationEvent, NoOpEventPublisher,
    ReportStatusPayload, WarnUserPayload,
};
pub use moderation::{
    CreateReportInput, ModerateReportInput, ModerationService, ModerationStores, ProcessOutcome,
};
pub use point_limiter::{AdminPointLimiter, PointBudget, ReportRateLimiter, action_cost};
pub use report_queue::{NoOpReportQueue, ReportQueue, ReportQueueService};
pub use scoring::{ModerationDecision, ScoringPolicy};
