//! In-memory implementation of every store trait.
//!
//! Mirrors the transactional behaviour of the sea-orm repositories closely
//! enough for service-level and end-to-end tests: a commit either applies
//! completely or not at all.

use crate::entities::{
    ban::{self, BanType},
    report::{self, ReportStatus},
    user::{self, AccountStatus},
    warning,
};
use crate::stores::{
    CommitOutcome, ContentMeta, ContentRef, ContentStore, EnforcementCommit, EnforcementStore,
    IdentityStore, NewBan, NewWarning, ReportStore, Sanction,
};
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, user::Model>,
    content: HashMap<ContentRef, ContentMeta>,
    reports: BTreeMap<String, report::Model>,
    bans: Vec<ban::Model>,
    warnings: Vec<warning::Model>,
    fail_writes: bool,
    fail_content_reads: bool,
}

impl State {
    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes {
            return Err(AppError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn apply_ban(&mut self, new_ban: NewBan) -> ban::Model {
        let status = new_ban.resulting_status();
        if let Some(user) = self.users.get_mut(&new_ban.user_id) {
            let downgrade = status == AccountStatus::Suspended
                && user.status == AccountStatus::Terminated;
            if !downgrade {
                user.status = status;
                user.updated_at = Some(Utc::now().into());
            }
        }

        let model = ban::Model {
            id: new_ban.id,
            user_id: new_ban.user_id,
            report_id: new_ban.report_id,
            title: new_ban.title,
            reasons: serde_json::json!(new_ban.reasons),
            ban_type: new_ban.ban_type,
            severity: new_ban.severity,
            banned_by: new_ban.banned_by,
            expires_at: new_ban.expires_at.map(Into::into),
            duration_ms: new_ban.duration_ms,
            created_at: Utc::now().into(),
        };
        self.bans.push(model.clone());
        model
    }

    fn apply_warning(&mut self, new_warning: NewWarning) -> warning::Model {
        let model = warning::Model {
            id: new_warning.id,
            user_id: new_warning.user_id,
            report_id: new_warning.report_id,
            title: new_warning.title,
            reasons: serde_json::json!(new_warning.reasons),
            severity: new_warning.severity,
            warned_by: new_warning.warned_by,
            expires_at: new_warning.expires_at.into(),
            acknowledged_at: None,
            created_at: Utc::now().into(),
        };
        self.warnings.push(model.clone());
        model
    }
}

/// In-memory store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    pub async fn insert_user(&self, id: &str, is_admin: bool, is_moderator: bool) -> user::Model {
        let model = user::Model {
            id: id.to_string(),
            username: format!("user_{id}"),
            is_admin,
            is_moderator,
            status: AccountStatus::Active,
            created_at: Utc::now().into(),
            updated_at: None,
        };
        self.state
            .lock()
            .await
            .users
            .insert(id.to_string(), model.clone());
        model
    }

    /// Add a content item.
    pub async fn insert_content(&self, content: ContentRef, meta: ContentMeta) {
        self.state.lock().await.content.insert(content, meta);
    }

    /// Make every subsequent write fail, as if the database were down.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    /// Make content lookups fail.
    pub async fn set_fail_content_reads(&self, fail: bool) {
        self.state.lock().await.fail_content_reads = fail;
    }

    /// Current account status of a user.
    pub async fn user_status(&self, user_id: &str) -> Option<AccountStatus> {
        self.state.lock().await.users.get(user_id).map(|u| u.status)
    }

    /// Whether a content item is active.
    pub async fn is_content_active(&self, content: &ContentRef) -> Option<bool> {
        self.state
            .lock()
            .await
            .content
            .get(content)
            .map(|m| m.is_active)
    }

    /// All bans written so far.
    pub async fn bans(&self) -> Vec<ban::Model> {
        self.state.lock().await.bans.clone()
    }

    /// All warnings written so far.
    pub async fn warnings(&self) -> Vec<warning::Model> {
        self.state.lock().await.warnings.clone()
    }

    /// All reports, oldest first.
    pub async fn reports(&self) -> Vec<report::Model> {
        self.state.lock().await.reports.values().cloned().collect()
    }

    /// Overwrite a report, bypassing status checks.
    pub async fn put_report(&self, model: report::Model) {
        self.state
            .lock()
            .await
            .reports
            .insert(model.id.clone(), model);
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn find_content_meta(&self, content: &ContentRef) -> AppResult<Option<ContentMeta>> {
        let state = self.state.lock().await;
        if state.fail_content_reads {
            return Err(AppError::Database("content table unavailable".to_string()));
        }
        Ok(state.content.get(content).cloned())
    }

    async fn set_active(&self, content: &ContentRef, active: bool) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        Ok(state
            .content
            .get_mut(content)
            .map(|meta| meta.is_active = active)
            .is_some())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_user(&self, user_id: &str) -> AppResult<Option<user::Model>> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn update_user_status(&self, user_id: &str, status: AccountStatus) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;
        user.status = status;
        Ok(())
    }

    async fn create_ban(&self, ban: NewBan) -> AppResult<ban::Model> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        Ok(state.apply_ban(ban))
    }

    async fn create_warning(&self, warning: NewWarning) -> AppResult<warning::Model> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        Ok(state.apply_warning(warning))
    }

    async fn find_warning(&self, warning_id: &str) -> AppResult<Option<warning::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .warnings
            .iter()
            .find(|w| w.id == warning_id)
            .cloned())
    }

    async fn acknowledge_warning(
        &self,
        warning_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<warning::Model> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        let warning = state
            .warnings
            .iter_mut()
            .find(|w| w.id == warning_id)
            .ok_or_else(|| AppError::NotFound(format!("Warning {warning_id} not found")))?;
        if warning.acknowledged_at.is_none() {
            warning.acknowledged_at = Some(at.into());
        }
        Ok(warning.clone())
    }

    async fn bans_for_user(&self, user_id: &str) -> AppResult<Vec<ban::Model>> {
        let state = self.state.lock().await;
        let mut bans: Vec<_> = state
            .bans
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bans.reverse();
        Ok(bans)
    }

    async fn release_expired_suspensions(&self, now: DateTime<Utc>) -> AppResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.check_writable()?;

        let suspended: Vec<String> = state
            .users
            .values()
            .filter(|u| u.status == AccountStatus::Suspended)
            .map(|u| u.id.clone())
            .collect();

        let mut released = Vec::new();
        for user_id in suspended {
            let bound = state.bans.iter().any(|b| {
                b.user_id == user_id
                    && match b.ban_type {
                        BanType::Perm => true,
                        BanType::Temp => b.expires_at.is_some_and(|at| at > now),
                    }
            });
            if bound {
                continue;
            }
            if let Some(user) = state.users.get_mut(&user_id) {
                user.status = AccountStatus::Active;
                released.push(user_id);
            }
        }
        released.sort();
        Ok(released)
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn create_report(&self, report: report::Model) -> AppResult<report::Model> {
        let mut state = self.state.lock().await;
        state.check_writable()?;
        if state.reports.contains_key(&report.id) {
            return Err(AppError::Conflict(format!("Report {} already exists", report.id)));
        }
        state.reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    async fn find_report(&self, report_id: &str) -> AppResult<Option<report::Model>> {
        Ok(self.state.lock().await.reports.get(report_id).cloned())
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<report::Model>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .values()
            .rev()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn reports_against_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<report::Model>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .values()
            .rev()
            .filter(|r| r.target_user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stale_pending_reports(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<report::Model>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .values()
            .filter(|r| r.status == ReportStatus::Pending && r.created_at < older_than)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EnforcementStore for InMemoryStore {
    async fn commit(&self, commit: EnforcementCommit) -> AppResult<CommitOutcome> {
        let mut state = self.state.lock().await;
        state.check_writable()?;

        let Some(current) = state.reports.get(&commit.report_id) else {
            return Ok(CommitOutcome::AlreadySettled);
        };
        if current.status != commit.expected_status {
            return Ok(CommitOutcome::AlreadySettled);
        }

        let resolution = commit.resolution;
        let mut updated = current.clone();
        updated.status = resolution.status;
        updated.severity = resolution.severity;
        updated.actions_taken = serde_json::json!(resolution.actions_taken);
        if let Some(decisions) = resolution.ai_decisions {
            updated.ai_decisions = serde_json::json!(decisions);
        }
        if let Some(confidence) = resolution.ai_confidence {
            updated.ai_confidence = confidence;
        }
        if let Some(reasons) = resolution.ai_reasons {
            updated.ai_reasons = serde_json::json!(reasons);
        }
        if let Some(reasons) = resolution.admin_reasons {
            updated.admin_reasons = Some(serde_json::json!(reasons));
        }
        if resolution.resolved_by.is_some() {
            updated.resolved_by = resolution.resolved_by;
        }
        updated.updated_at = Some(Utc::now().into());
        state.reports.insert(updated.id.clone(), updated.clone());

        let (ban, warning) = match commit.sanction {
            Some(Sanction::Ban(new_ban)) => (Some(state.apply_ban(new_ban)), None),
            Some(Sanction::Warn(new_warning)) => (None, Some(state.apply_warning(new_warning))),
            None => (None, None),
        };

        let content_deactivated = match &commit.deactivate {
            Some(content) => state
                .content
                .get_mut(content)
                .map(|meta| meta.is_active = false)
                .is_some(),
            None => false,
        };

        Ok(CommitOutcome::Applied {
            report: updated,
            ban,
            warning,
            content_deactivated,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::ban::{ModerationSource, SeverityTier};
    use crate::entities::report::{ModerationAction, ReportReason, TargetType};
    use crate::stores::ReportResolution;

    fn pending_report(id: &str) -> report::Model {
        report::Model {
            id: id.to_string(),
            reported_by: "reporter".to_string(),
            target_id: "q1".to_string(),
            target_type: TargetType::Question,
            target_user_id: "author".to_string(),
            report_reason: ReportReason::Spam,
            report_comment: None,
            severity: 0,
            ai_decisions: serde_json::json!(["UNCERTAIN"]),
            ai_confidence: 0.0,
            ai_reasons: serde_json::json!([]),
            status: ReportStatus::Pending,
            actions_taken: serde_json::json!([]),
            admin_reasons: None,
            resolved_by: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn temp_ban_commit(ban_id: &str) -> EnforcementCommit {
        EnforcementCommit {
            report_id: "r1".to_string(),
            expected_status: ReportStatus::Pending,
            resolution: ReportResolution {
                status: ReportStatus::Resolved,
                severity: 75,
                ai_decisions: None,
                ai_confidence: None,
                ai_reasons: None,
                actions_taken: vec![ModerationAction::BanUserTemp, ModerationAction::RemoveContent],
                admin_reasons: None,
                resolved_by: None,
            },
            sanction: Some(Sanction::Ban(NewBan {
                id: ban_id.to_string(),
                user_id: "author".to_string(),
                report_id: Some("r1".to_string()),
                title: "Temporary Account Suspension".to_string(),
                reasons: vec![],
                ban_type: BanType::Temp,
                severity: SeverityTier::Four,
                banned_by: ModerationSource::AiModeration,
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
                duration_ms: Some(3_600_000),
            })),
            deactivate: Some(ContentRef::new(TargetType::Question, "q1")),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_user("author", false, false).await;
        store
            .insert_content(
                ContentRef::new(TargetType::Question, "q1"),
                ContentMeta {
                    owner_id: "author".to_string(),
                    title: Some("title".to_string()),
                    body: "body".to_string(),
                    is_active: true,
                    parent_id: None,
                },
            )
            .await;
        store.create_report(pending_report("r1")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_second_commit_is_a_no_op() {
        let store = seeded().await;

        let first = store.commit(temp_ban_commit("b1")).await.unwrap();
        let second = store.commit(temp_ban_commit("b2")).await.unwrap();

        assert!(matches!(first, CommitOutcome::Applied { .. }));
        assert!(matches!(second, CommitOutcome::AlreadySettled));
        assert_eq!(store.bans().await.len(), 1);
        assert_eq!(
            store.user_status("author").await,
            Some(AccountStatus::Suspended)
        );
        assert_eq!(
            store
                .is_content_active(&ContentRef::new(TargetType::Question, "q1"))
                .await,
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let store = seeded().await;
        store.set_fail_writes(true).await;

        assert!(store.commit(temp_ban_commit("b1")).await.is_err());

        store.set_fail_writes(false).await;
        assert!(store.bans().await.is_empty());
        let report = store.find_report("r1").await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn test_release_expired_suspensions() {
        let store = seeded().await;
        store.insert_user("other", false, false).await;
        store
            .update_user_status("other", AccountStatus::Suspended)
            .await
            .unwrap();
        store.commit(temp_ban_commit("b1")).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            store.release_expired_suspensions(now).await.unwrap(),
            vec!["other".to_string()]
        );

        let later = now + chrono::Duration::hours(2);
        assert_eq!(
            store.release_expired_suspensions(later).await.unwrap(),
            vec!["author".to_string()]
        );
    }
}
