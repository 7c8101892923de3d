//! Dead-letter set for report moderation jobs that failed.
//!
//! Entries are keyed by report id, so a report that keeps failing occupies
//! one slot and its attempt counter grows. Successful processing clears the
//! slot. [`replay_dead_letters`] pushes every entry back onto the queue.

#![allow(missing_docs)]

use crate::jobs::ReportModerationJob;
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::clients::Client as RedisClient;
use fred::interfaces::HashesInterface;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Redis hash holding dead-lettered jobs.
pub const DEAD_LETTER_KEY: &str = "moderation:dead_letter";

/// Dead letter entry for a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    /// The failed job.
    pub job: ReportModerationJob,
    /// Number of failed runs recorded.
    pub attempts: u32,
    /// Last error message.
    pub last_error: String,
    /// Timestamp of last failure.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Create a new dead letter entry.
    #[must_use]
    pub fn new(job: ReportModerationJob, error: String) -> Self {
        Self {
            job,
            attempts: 1,
            last_error: error,
            failed_at: Utc::now(),
        }
    }

    fn failed_again(mut self, job: ReportModerationJob, error: String) -> Self {
        self.job = job;
        self.attempts += 1;
        self.last_error = error;
        self.failed_at = Utc::now();
        self
    }
}

/// Storage for dead-lettered jobs.
#[async_trait]
pub trait DeadLetterSet: Send + Sync {
    /// Record a failure, merging with any earlier entry for the same report.
    async fn record(&self, job: &ReportModerationJob, error: &str) -> AppResult<DeadLetterEntry>;

    /// Drop the entry for a report. Returns whether one existed.
    async fn clear(&self, report_id: &str) -> AppResult<bool>;

    /// All entries.
    async fn entries(&self) -> AppResult<Vec<DeadLetterEntry>>;
}

/// Anything that can take a job back.
#[async_trait]
pub trait ModerationJobSink: Send + Sync {
    /// Push a job onto the moderation queue.
    async fn push_job(&self, job: ReportModerationJob) -> AppResult<()>;
}

/// Re-enqueue every dead-lettered job. Returns how many were pushed.
///
/// Entries stay in the set until the job succeeds.
pub async fn replay_dead_letters(
    dead_letters: &dyn DeadLetterSet,
    sink: &dyn ModerationJobSink,
) -> AppResult<usize> {
    let entries = dead_letters.entries().await?;
    let mut replayed = 0;

    for entry in entries {
        let report_id = entry.job.report_id().to_string();
        match sink.push_job(entry.job).await {
            Ok(()) => replayed += 1,
            Err(e) => warn!(error = %e, report_id = %report_id, "Failed to replay dead letter"),
        }
    }

    info!(count = replayed, "Replayed dead-lettered moderation jobs");
    Ok(replayed)
}

fn decode(raw: &str) -> AppResult<DeadLetterEntry> {
    serde_json::from_str(raw).map_err(|e| AppError::Queue(format!("Corrupt dead letter: {e}")))
}

fn encode(entry: &DeadLetterEntry) -> AppResult<String> {
    serde_json::to_string(entry).map_err(|e| AppError::Queue(format!("Serialization error: {e}")))
}

/// Dead-letter set in a Redis hash.
#[derive(Clone)]
pub struct RedisDeadLetters {
    redis: Arc<RedisClient>,
}

impl RedisDeadLetters {
    /// Create a new Redis dead-letter set.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DeadLetterSet for RedisDeadLetters {
    async fn record(&self, job: &ReportModerationJob, error: &str) -> AppResult<DeadLetterEntry> {
        let existing: Option<String> = self.redis.hget(DEAD_LETTER_KEY, job.report_id()).await?;

        let entry = match existing.as_deref().map(decode) {
            Some(Ok(previous)) => previous.failed_again(job.clone(), error.to_string()),
            Some(Err(e)) => {
                warn!(error = %e, report_id = %job.report_id(), "Overwriting corrupt dead letter");
                DeadLetterEntry::new(job.clone(), error.to_string())
            }
            None => DeadLetterEntry::new(job.clone(), error.to_string()),
        };

        let _: i64 = self
            .redis
            .hset(DEAD_LETTER_KEY, (job.report_id(), encode(&entry)?))
            .await?;
        Ok(entry)
    }

    async fn clear(&self, report_id: &str) -> AppResult<bool> {
        let removed: i64 = self.redis.hdel(DEAD_LETTER_KEY, report_id).await?;
        Ok(removed > 0)
    }

    async fn entries(&self) -> AppResult<Vec<DeadLetterEntry>> {
        let raw: HashMap<String, String> = self.redis.hgetall(DEAD_LETTER_KEY).await?;

        Ok(raw
            .into_iter()
            .filter_map(|(report_id, value)| match decode(&value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, report_id = %report_id, "Skipping corrupt dead letter");
                    None
                }
            })
            .collect())
    }
}

/// In-process dead-letter set.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadLetters {
    entries: Arc<Mutex<BTreeMap<String, DeadLetterEntry>>>,
}

impl MemoryDeadLetters {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterSet for MemoryDeadLetters {
    async fn record(&self, job: &ReportModerationJob, error: &str) -> AppResult<DeadLetterEntry> {
        let mut entries = self.entries.lock().await;
        let entry = match entries.remove(job.report_id()) {
            Some(previous) => previous.failed_again(job.clone(), error.to_string()),
            None => DeadLetterEntry::new(job.clone(), error.to_string()),
        };
        entries.insert(job.report_id().to_string(), entry.clone());
        Ok(entry)
    }

    async fn clear(&self, report_id: &str) -> AppResult<bool> {
        Ok(self.entries.lock().await.remove(report_id).is_some())
    }

    async fn entries(&self) -> AppResult<Vec<DeadLetterEntry>> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }
}
