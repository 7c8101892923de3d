//! Event publisher service.
//!
//! Provides an abstraction for pushing moderation outcomes to users in real time.
//! The actual implementation is provided by the queue crate (Redis Pub/Sub).

use agora_common::{AppError, AppResult};
use agora_db::entities::{
    ban::{self, BanType, ModerationSource, SeverityTier},
    report::{ModerationAction, ReportStatus},
    warning,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload of a `banUser` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanUserPayload {
    pub user_id: String,
    pub title: String,
    pub reasons: Vec<String>,
    pub ban_type: BanType,
    pub severity: SeverityTier,
    pub banned_by: ModerationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl From<&ban::Model> for BanUserPayload {
    fn from(ban: &ban::Model) -> Self {
        Self {
            user_id: ban.user_id.clone(),
            title: ban.title.clone(),
            reasons: ban.reason_list(),
            ban_type: ban.ban_type,
            severity: ban.severity,
            banned_by: ban.banned_by,
            expires_at: ban.expires_at,
            duration_ms: ban.duration_ms,
        }
    }
}

/// Payload of a `warnUser` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarnUserPayload {
    pub user_id: String,
    pub title: String,
    pub reasons: Vec<String>,
    pub severity: SeverityTier,
    pub warned_by: ModerationSource,
    pub expires_at: DateTime<FixedOffset>,
}

impl From<&warning::Model> for WarnUserPayload {
    fn from(warning: &warning::Model) -> Self {
        Self {
            user_id: warning.user_id.clone(),
            title: warning.title.clone(),
            reasons: warning.reason_list(),
            severity: warning.severity,
            warned_by: warning.warned_by,
            expires_at: warning.expires_at,
        }
    }
}

/// Payload of a `reportStatusChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusPayload {
    pub report_id: String,
    pub actions_taken: Vec<ModerationAction>,
    pub status: ReportStatus,
}

/// Event types pushed to a user's live connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationEvent {
    /// The user was banned.
    BanUser(BanUserPayload),
    /// The user received a warning.
    WarnUser(WarnUserPayload),
    /// A report the user filed was settled.
    ReportStatusChanged(ReportStatusPayload),
}

impl ModerationEvent {
    /// Event name on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BanUser(_) => "banUser",
            Self::WarnUser(_) => "warnUser",
            Self::ReportStatusChanged(_) => "reportStatusChanged",
        }
    }

    /// Event body as JSON.
    pub fn payload(&self) -> AppResult<serde_json::Value> {
        let value = match self {
            Self::BanUser(p) => serde_json::to_value(p),
            Self::WarnUser(p) => serde_json::to_value(p),
            Self::ReportStatusChanged(p) => serde_json::to_value(p),
        };
        value.map_err(|e| AppError::Internal(format!("Failed to serialize event: {e}")))
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without directly depending on the queue/pubsub implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Push an event to every live connection of a user, on any process.
    async fn publish_to_user(&self, user_id: &str, event: &ModerationEvent) -> AppResult<()>;

    /// Close every live connection of a user, on any process.
    async fn disconnect_user(&self, user_id: &str) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_to_user(&self, _user_id: &str, _event: &ModerationEvent) -> AppResult<()> {
        Ok(())
    }

    async fn disconnect_user(&self, _user_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
