//! Storage capabilities consumed by the moderation pipeline.
//!
//! Each trait has a sea-orm implementation in [`crate::repositories`] and an
//! in-memory one in `crate::memory` (behind the `test-utils` feature).

use crate::entities::{
    ban::{self, BanType, ModerationSource, SeverityTier},
    report::{self, AiDecision, ModerationAction, ReportStatus, TargetType},
    user::{self, AccountStatus},
    warning,
};
use agora_common::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a question, answer or reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRef {
    pub target_type: TargetType,
    pub target_id: String,
}

impl ContentRef {
    /// Create a new content reference.
    #[must_use]
    pub fn new(target_type: TargetType, target_id: impl Into<String>) -> Self {
        Self {
            target_type,
            target_id: target_id.into(),
        }
    }

    /// Snapshot cache key for this item.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.target_type.cache_key(&self.target_id)
    }
}

/// Minimal projection of a content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMeta {
    pub owner_id: String,
    /// Questions only.
    pub title: Option<String>,
    pub body: String,
    pub is_active: bool,
    /// Question id for answers, answer id for replies.
    pub parent_id: Option<String>,
}

/// Read and deactivate questions, answers and replies.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up the minimal projection of a content item.
    async fn find_content_meta(&self, content: &ContentRef) -> AppResult<Option<ContentMeta>>;

    /// Set the active flag. Returns whether a row was touched.
    async fn set_active(&self, content: &ContentRef, active: bool) -> AppResult<bool>;
}

/// A ban about to be written.
#[derive(Debug, Clone)]
pub struct NewBan {
    pub id: String,
    pub user_id: String,
    pub report_id: Option<String>,
    pub title: String,
    pub reasons: Vec<String>,
    pub ban_type: BanType,
    pub severity: SeverityTier,
    pub banned_by: ModerationSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl NewBan {
    /// Account status the banned user moves to.
    #[must_use]
    pub const fn resulting_status(&self) -> AccountStatus {
        match self.ban_type {
            BanType::Perm => AccountStatus::Terminated,
            BanType::Temp => AccountStatus::Suspended,
        }
    }

    pub(crate) fn into_active_model(self) -> ban::ActiveModel {
        use sea_orm::Set;

        ban::ActiveModel {
            id: Set(self.id),
            user_id: Set(self.user_id),
            report_id: Set(self.report_id),
            title: Set(self.title),
            reasons: Set(serde_json::json!(self.reasons)),
            ban_type: Set(self.ban_type),
            severity: Set(self.severity),
            banned_by: Set(self.banned_by),
            expires_at: Set(self.expires_at.map(Into::into)),
            duration_ms: Set(self.duration_ms),
            created_at: Set(Utc::now().into()),
        }
    }
}

/// A warning about to be written.
#[derive(Debug, Clone)]
pub struct NewWarning {
    pub id: String,
    pub user_id: String,
    pub report_id: Option<String>,
    pub title: String,
    pub reasons: Vec<String>,
    pub severity: SeverityTier,
    pub warned_by: ModerationSource,
    pub expires_at: DateTime<Utc>,
}

impl NewWarning {
    pub(crate) fn into_active_model(self) -> warning::ActiveModel {
        use sea_orm::Set;

        warning::ActiveModel {
            id: Set(self.id),
            user_id: Set(self.user_id),
            report_id: Set(self.report_id),
            title: Set(self.title),
            reasons: Set(serde_json::json!(self.reasons)),
            severity: Set(self.severity),
            warned_by: Set(self.warned_by),
            expires_at: Set(self.expires_at.into()),
            acknowledged_at: Set(None),
            created_at: Set(Utc::now().into()),
        }
    }
}

/// Users, bans and warnings.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find a user by id.
    async fn find_user(&self, user_id: &str) -> AppResult<Option<user::Model>>;

    /// Set a user's account status.
    async fn update_user_status(&self, user_id: &str, status: AccountStatus) -> AppResult<()>;

    /// Write a ban and move the user's account status in one transaction.
    async fn create_ban(&self, ban: NewBan) -> AppResult<ban::Model>;

    /// Write a warning. Account status is untouched.
    async fn create_warning(&self, warning: NewWarning) -> AppResult<warning::Model>;

    /// Find a warning by id.
    async fn find_warning(&self, warning_id: &str) -> AppResult<Option<warning::Model>>;

    /// Stamp a warning as acknowledged.
    async fn acknowledge_warning(
        &self,
        warning_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<warning::Model>;

    /// Bans issued against a user, newest first.
    async fn bans_for_user(&self, user_id: &str) -> AppResult<Vec<ban::Model>>;

    /// Return suspended users with no PERM ban and no unexpired TEMP ban to ACTIVE.
    ///
    /// Returns the ids of the users restored.
    async fn release_expired_suspensions(&self, now: DateTime<Utc>) -> AppResult<Vec<String>>;
}

/// Report persistence and queries.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a new report.
    async fn create_report(&self, report: report::Model) -> AppResult<report::Model>;

    /// Find a report by id.
    async fn find_report(&self, report_id: &str) -> AppResult<Option<report::Model>>;

    /// List reports, newest first, optionally filtered by status.
    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<report::Model>>;

    /// Reports filed against a user, newest first.
    async fn reports_against_user(&self, user_id: &str, limit: u64)
    -> AppResult<Vec<report::Model>>;

    /// PENDING reports created before `older_than`, oldest first.
    async fn stale_pending_reports(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<report::Model>>;
}

/// Fields written to a report when it leaves its current status.
#[derive(Debug, Clone)]
pub struct ReportResolution {
    pub status: ReportStatus,
    pub severity: i32,
    /// `None` keeps what the classifier recorded.
    pub ai_decisions: Option<Vec<AiDecision>>,
    pub ai_confidence: Option<f64>,
    pub ai_reasons: Option<Vec<String>>,
    pub actions_taken: Vec<ModerationAction>,
    pub admin_reasons: Option<Vec<String>>,
    pub resolved_by: Option<String>,
}

/// Trust-state change attached to a report settlement.
#[derive(Debug, Clone)]
pub enum Sanction {
    Ban(NewBan),
    Warn(NewWarning),
}

/// Everything one settlement writes, applied atomically.
#[derive(Debug, Clone)]
pub struct EnforcementCommit {
    pub report_id: String,
    /// The report must still be in this status, or nothing is written.
    pub expected_status: ReportStatus,
    pub resolution: ReportResolution,
    pub sanction: Option<Sanction>,
    /// Content to deactivate.
    pub deactivate: Option<ContentRef>,
}

/// Result of an [`EnforcementCommit`].
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// Everything was written.
    Applied {
        report: report::Model,
        ban: Option<ban::Model>,
        warning: Option<warning::Model>,
        content_deactivated: bool,
    },
    /// The report had already left the expected status; nothing was written.
    AlreadySettled,
}

/// Atomic settlement of a report.
#[async_trait]
pub trait EnforcementStore: Send + Sync {
    /// Apply the report update, sanction and content deactivation in one unit of work.
    async fn commit(&self, commit: EnforcementCommit) -> AppResult<CommitOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_resulting_status() {
        let mut ban = NewBan {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            report_id: None,
            title: "Permanent Account Suspension".to_string(),
            reasons: vec![],
            ban_type: BanType::Perm,
            severity: SeverityTier::Five,
            banned_by: ModerationSource::AiModeration,
            expires_at: None,
            duration_ms: None,
        };
        assert_eq!(ban.resulting_status(), AccountStatus::Terminated);

        ban.ban_type = BanType::Temp;
        assert_eq!(ban.resulting_status(), AccountStatus::Suspended);
    }

    #[test]
    fn test_content_ref_cache_key() {
        let content = ContentRef::new(TargetType::Answer, "a9");
        assert_eq!(content.cache_key(), "answer:a9");
    }
}
