//! Background moderation work and real-time delivery for agora.
//!
//! This crate provides asynchronous processing using Redis:
//!
//! - **Jobs**: typed report moderation jobs tagged by target type
//! - **Workers**: concurrent job execution with Apalis
//! - **Dead letters**: failed jobs kept per report for replay
//! - **Pub/Sub**: cross-process socket events
//! - **Presence**: shared directory of live connections and per-process fan-out
//! - **Scheduler**: periodic tasks (stale report requeue, suspension expiry)

pub mod dead_letter;
pub mod fanout;
pub mod hub;
pub mod jobs;
pub mod presence;
pub mod pubsub;
pub mod report_queue_impl;
pub mod scheduler;
pub mod workers;

pub use dead_letter::{
    DEAD_LETTER_KEY, DeadLetterEntry, DeadLetterSet, MemoryDeadLetters, ModerationJobSink,
    RedisDeadLetters, replay_dead_letters,
};
pub use fanout::PresenceFanout;
pub use hub::{ConnectionHub, OutboundMessage};
pub use jobs::*;
pub use presence::{MemoryPresence, PresenceDirectory, RedisPresence};
pub use pubsub::{
    LocalPubSub, RedisPubSub, SocketDisconnect, SocketEmit, SocketMessage,
    channels as pubsub_channels,
};
pub use report_queue_impl::RedisReportQueue;
pub use scheduler::{MaintenanceExecutor, ScheduledJob, SchedulerConfig, run_job, run_scheduler};
pub use workers::*;
