//! Moderation service for reports, automatic classification and trust enforcement.
//!
//! Settling a report happens in two phases. The state phase writes the report
//! update, the ban or warning and the content deactivation through one
//! [`EnforcementStore::commit`]. The notification phase runs afterwards and only
//! logs its failures.

use crate::services::{
    classifier::{AiModerator, ClassifierVerdict, ContentClassifier},
    content_snapshot::ContentSnapshotReader,
    event_publisher::{
        BanUserPayload, EventPublisherService, ModerationEvent, ReportStatusPayload,
        WarnUserPayload,
    },
    point_limiter::{AdminPointLimiter, ReportRateLimiter},
    report_queue::ReportQueueService,
    scoring::{ModerationDecision, ScoringPolicy},
};
use agora_common::{AppError, AppResult, CacheStore, IdGenerator};
use agora_db::{
    CommitOutcome, ContentRef, ContentStore, EnforcementCommit, EnforcementStore, IdentityStore,
    NewBan, NewWarning, ReportResolution, ReportStore, Sanction,
    entities::{
        ban::{self, BanType, ModerationSource, SeverityTier},
        report::{self, AiDecision, ModerationAction, ReportReason, ReportStatus, TargetType},
        warning,
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use validator::Validate;

const PERM_BAN_TITLE: &str = "Permanent Account Suspension";
const TEMP_BAN_TITLE: &str = "Temporary Account Suspension";
const WARNING_TITLE: &str = "Community Guideline Warning";
const WARNING_DAYS: i64 = 7;
const MAX_LIST_LIMIT: u64 = 100;

/// Expiry of a temporary ban starting at `now`.
fn ban_expiry(now: DateTime<Utc>, duration_ms: i64) -> AppResult<DateTime<Utc>> {
    TimeDelta::try_milliseconds(duration_ms)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| AppError::BadRequest(format!("banDurationMs {duration_ms} is out of range")))
}

/// Input for filing a report.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportInput {
    #[validate(length(min = 1, max = 64))]
    pub target_id: String,
    /// Claimed owner of the content; must match the real owner.
    #[validate(length(min = 1, max = 64))]
    pub target_user_id: String,
    pub target_type: TargetType,
    pub report_reason: ReportReason,
    #[validate(length(min = 3, max = 150))]
    pub report_comment: Option<String>,
}

/// Input for settling a REVIEWING report by hand.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModerateReportInput {
    pub report_id: String,
    pub action_taken: ModerationDecision,
    #[validate(length(max = 10))]
    pub reasons: Vec<String>,
    pub severity: SeverityTier,
    /// Required for temporary bans.
    #[validate(range(min = 1))]
    pub ban_duration_ms: Option<i64>,
}

/// What a worker run did with a report.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Report missing or no longer PENDING; nothing was written.
    Skipped,
    /// This run settled the report.
    Settled {
        decision: ModerationDecision,
        severity: i32,
        status: ReportStatus,
    },
}

/// Storage capabilities the service needs.
#[derive(Clone)]
pub struct ModerationStores {
    pub content: Arc<dyn ContentStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub reports: Arc<dyn ReportStore>,
    pub enforcement: Arc<dyn EnforcementStore>,
}

impl ModerationStores {
    /// Use one backend for every capability.
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ContentStore + IdentityStore + ReportStore + EnforcementStore + 'static,
    {
        Self {
            content: store.clone(),
            identity: store.clone(),
            reports: store.clone(),
            enforcement: store,
        }
    }
}

/// One planned settlement, shared by the worker and manual paths.
struct Settlement<'a> {
    report: &'a report::Model,
    expected_status: ReportStatus,
    decision: ModerationDecision,
    severity: i32,
    tier: SeverityTier,
    reasons: Vec<String>,
    source: ModerationSource,
    ban_duration_ms: Option<i64>,
    verdict: Option<ClassifierVerdict>,
    resolved_by: Option<String>,
}

/// Result of the state phase.
struct Settled {
    report: report::Model,
    ban: Option<ban::Model>,
    warning: Option<warning::Model>,
    content_deactivated: bool,
}

/// Moderation service for reports, bans and warnings.
#[derive(Clone)]
pub struct ModerationService {
    stores: ModerationStores,
    cache: Arc<dyn CacheStore>,
    snapshots: ContentSnapshotReader,
    moderator: AiModerator,
    policy: ScoringPolicy,
    admin_limiter: AdminPointLimiter,
    report_limiter: ReportRateLimiter,
    event_publisher: Option<EventPublisherService>,
    report_queue: Option<ReportQueueService>,
    id_gen: IdGenerator,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub fn new(
        stores: ModerationStores,
        cache: Arc<dyn CacheStore>,
        classifier: Arc<dyn ContentClassifier>,
        classifier_timeout: Duration,
    ) -> Self {
        let policy = ScoringPolicy::default();
        Self {
            snapshots: ContentSnapshotReader::new(cache.clone(), stores.content.clone()),
            moderator: AiModerator::new(classifier, policy, classifier_timeout),
            policy,
            admin_limiter: AdminPointLimiter::new(cache.clone()),
            report_limiter: ReportRateLimiter::new(cache.clone()),
            event_publisher: None,
            report_queue: None,
            id_gen: IdGenerator::new(),
            stores,
            cache,
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Set the report queue.
    pub fn set_report_queue(&mut self, report_queue: ReportQueueService) {
        self.report_queue = Some(report_queue);
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    // ========== Intake ==========

    /// File a report and queue it for automatic moderation.
    pub async fn create_report(
        &self,
        reporter_id: &str,
        input: CreateReportInput,
    ) -> AppResult<report::Model> {
        input.validate()?;

        let content = ContentRef::new(input.target_type, input.target_id.clone());
        let meta = self
            .stores
            .content
            .find_content_meta(&content)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!("{} {}", input.target_type, input.target_id))
            })?;

        if meta.owner_id != input.target_user_id {
            return Err(AppError::BadRequest(
                "targetUserId does not own the reported content".to_string(),
            ));
        }
        if meta.owner_id == reporter_id {
            return Err(AppError::BadRequest(
                "Cannot report your own content".to_string(),
            ));
        }

        self.report_limiter.check(reporter_id).await?;

        let model = report::Model {
            id: self.id_gen.generate(),
            reported_by: reporter_id.to_string(),
            target_id: input.target_id,
            target_type: input.target_type,
            target_user_id: input.target_user_id,
            report_reason: input.report_reason,
            report_comment: input.report_comment,
            severity: 0,
            ai_decisions: serde_json::json!([AiDecision::Uncertain]),
            ai_confidence: 0.0,
            ai_reasons: serde_json::json!([]),
            status: ReportStatus::Pending,
            actions_taken: serde_json::json!([]),
            admin_reasons: None,
            resolved_by: None,
            created_at: Utc::now().into(),
            updated_at: None,
        };

        let report = self.stores.reports.create_report(model).await?;
        info!(
            report_id = %report.id,
            reporter_id = %reporter_id,
            target_type = %report.target_type,
            "Report filed"
        );

        if let Some(ref queue) = self.report_queue {
            if let Err(e) = queue.enqueue(&report).await {
                error!(error = %e, report_id = %report.id, "Failed to enqueue report");
            }
        }

        Ok(report)
    }

    // ========== Automatic moderation ==========

    /// Classify a PENDING report and settle it. Safe to run more than once.
    pub async fn process_report(&self, report_id: &str) -> AppResult<ProcessOutcome> {
        self.process_report_as(report_id, None).await
    }

    /// Like [`Self::process_report`], but rejects the run when the stored report
    /// is about a different kind of content than `target_type`.
    pub async fn process_report_as(
        &self,
        report_id: &str,
        target_type: Option<TargetType>,
    ) -> AppResult<ProcessOutcome> {
        let Some(report) = self.stores.reports.find_report(report_id).await? else {
            warn!(report_id = %report_id, "Report vanished before processing");
            return Ok(ProcessOutcome::Skipped);
        };
        if let Some(expected) = target_type {
            if expected != report.target_type {
                return Err(AppError::Validation(format!(
                    "job targets a {expected} but report {report_id} is about a {}",
                    report.target_type
                )));
            }
        }
        if report.status != ReportStatus::Pending {
            debug!(report_id = %report_id, status = %report.status, "Report already processed");
            return Ok(ProcessOutcome::Skipped);
        }

        let content = ContentRef::new(report.target_type, report.target_id.clone());
        let snapshot = self.snapshots.read(&content).await?;
        let verdict = self
            .moderator
            .classify(&snapshot.classification_text(report.target_type))
            .await;

        let severity = self.policy.severity(&verdict.decisions, verdict.confidence);
        let decision = self.policy.decision(severity);
        let ban_duration_ms = match decision {
            ModerationDecision::BanUserTemp => {
                Some(self.policy.temp_ban_ms(severity, verdict.confidence))
            }
            _ => None,
        };

        let settlement = Settlement {
            report: &report,
            expected_status: ReportStatus::Pending,
            decision,
            severity,
            tier: self.policy.tier_for(severity),
            reasons: verdict.reasons.clone(),
            source: ModerationSource::AiModeration,
            ban_duration_ms,
            verdict: Some(verdict),
            resolved_by: None,
        };

        let Some(settled) = self.settle(settlement).await? else {
            debug!(report_id = %report_id, "Report settled by a concurrent run");
            return Ok(ProcessOutcome::Skipped);
        };

        info!(
            report_id = %report_id,
            user_id = %report.target_user_id,
            decision = %decision,
            severity,
            status = %settled.report.status,
            "Report moderated"
        );

        let status = settled.report.status;
        self.after_commit(&content, &settled).await;

        Ok(ProcessOutcome::Settled {
            decision,
            severity,
            status,
        })
    }

    // ========== Manual moderation ==========

    /// Settle a REVIEWING report by hand.
    pub async fn moderate_report(
        &self,
        admin_id: &str,
        input: ModerateReportInput,
    ) -> AppResult<report::Model> {
        input.validate()?;

        let admin = self
            .stores
            .identity
            .find_user(admin_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(admin_id.to_string()))?;
        if !admin.can_moderate() {
            return Err(AppError::Forbidden(
                "Only admins and moderators can moderate reports".to_string(),
            ));
        }

        let decision = input.action_taken;
        if decision == ModerationDecision::Uncertain {
            return Err(AppError::BadRequest(
                "UNCERTAIN is not a moderation action".to_string(),
            ));
        }
        if decision == ModerationDecision::BanUserTemp {
            let duration_ms = input.ban_duration_ms.ok_or_else(|| {
                AppError::BadRequest("banDurationMs is required for a temporary ban".to_string())
            })?;
            ban_expiry(Utc::now(), duration_ms)?;
        }

        let report = self
            .stores
            .reports
            .find_report(&input.report_id)
            .await?
            .ok_or_else(|| AppError::ReportNotFound(input.report_id.clone()))?;
        if report.status != ReportStatus::Reviewing {
            return Err(AppError::Conflict(format!(
                "Report {} is {}, not REVIEWING",
                report.id, report.status
            )));
        }

        self.admin_limiter.add_points(admin_id, decision).await?;

        let settlement = Settlement {
            report: &report,
            expected_status: ReportStatus::Reviewing,
            decision,
            severity: self.policy.floor_score(input.severity),
            tier: input.severity,
            reasons: input.reasons,
            source: ModerationSource::AdminModeration,
            ban_duration_ms: match decision {
                ModerationDecision::BanUserTemp => input.ban_duration_ms,
                _ => None,
            },
            verdict: None,
            resolved_by: Some(admin_id.to_string()),
        };

        let settled = self.settle(settlement).await?.ok_or_else(|| {
            AppError::Conflict(format!("Report {} was settled concurrently", report.id))
        })?;

        info!(
            report_id = %report.id,
            admin_id = %admin_id,
            user_id = %report.target_user_id,
            decision = %decision,
            "Report moderated by hand"
        );

        let content = ContentRef::new(report.target_type, report.target_id.clone());
        self.after_commit(&content, &settled).await;

        Ok(settled.report)
    }

    /// State phase: one atomic commit. `None` when the report already left the expected status.
    async fn settle(&self, plan: Settlement<'_>) -> AppResult<Option<Settled>> {
        let report = plan.report;
        let removes_content =
            plan.decision.is_punitive() && self.policy.removes_content(plan.severity);

        let mut actions_taken: Vec<ModerationAction> = plan.decision.action().into_iter().collect();
        if removes_content {
            actions_taken.push(ModerationAction::RemoveContent);
        }

        let status = match plan.decision {
            ModerationDecision::Uncertain => ReportStatus::Reviewing,
            ModerationDecision::Ignore => ReportStatus::Dismissed,
            _ => ReportStatus::Resolved,
        };

        let sanction = self.sanction_for(&plan)?;
        let deactivate =
            removes_content.then(|| ContentRef::new(report.target_type, report.target_id.clone()));

        let (ai_decisions, ai_confidence, ai_reasons, admin_reasons) = match plan.verdict {
            Some(verdict) => (
                Some(verdict.decisions),
                Some(verdict.confidence),
                Some(verdict.reasons),
                None,
            ),
            None => (None, None, None, Some(plan.reasons)),
        };

        let commit = EnforcementCommit {
            report_id: report.id.clone(),
            expected_status: plan.expected_status,
            resolution: ReportResolution {
                status,
                severity: plan.severity,
                ai_decisions,
                ai_confidence,
                ai_reasons,
                actions_taken,
                admin_reasons,
                resolved_by: plan.resolved_by,
            },
            sanction,
            deactivate,
        };

        match self.stores.enforcement.commit(commit).await {
            Ok(CommitOutcome::Applied {
                report,
                ban,
                warning,
                content_deactivated,
            }) => Ok(Some(Settled {
                report,
                ban,
                warning,
                content_deactivated,
            })),
            Ok(CommitOutcome::AlreadySettled) => Ok(None),
            Err(e) => {
                error!(error = %e, report_id = %report.id, "Failed to apply moderation outcome");
                Err(e)
            }
        }
    }

    fn sanction_for(&self, plan: &Settlement<'_>) -> AppResult<Option<Sanction>> {
        let report = plan.report;
        let now = Utc::now();

        Ok(match plan.decision {
            ModerationDecision::BanUserPerm => Some(Sanction::Ban(NewBan {
                id: self.id_gen.generate(),
                user_id: report.target_user_id.clone(),
                report_id: Some(report.id.clone()),
                title: PERM_BAN_TITLE.to_string(),
                reasons: plan.reasons.clone(),
                ban_type: BanType::Perm,
                severity: plan.tier,
                banned_by: plan.source,
                expires_at: None,
                duration_ms: None,
            })),
            ModerationDecision::BanUserTemp => {
                let duration_ms = plan.ban_duration_ms.unwrap_or_default();
                Some(Sanction::Ban(NewBan {
                    id: self.id_gen.generate(),
                    user_id: report.target_user_id.clone(),
                    report_id: Some(report.id.clone()),
                    title: TEMP_BAN_TITLE.to_string(),
                    reasons: plan.reasons.clone(),
                    ban_type: BanType::Temp,
                    severity: plan.tier,
                    banned_by: plan.source,
                    expires_at: Some(ban_expiry(now, duration_ms)?),
                    duration_ms: Some(duration_ms),
                }))
            }
            ModerationDecision::WarnUser => Some(Sanction::Warn(NewWarning {
                id: self.id_gen.generate(),
                user_id: report.target_user_id.clone(),
                report_id: Some(report.id.clone()),
                title: plan
                    .reasons
                    .first()
                    .cloned()
                    .unwrap_or_else(|| WARNING_TITLE.to_string()),
                reasons: plan.reasons.clone(),
                severity: plan.tier,
                warned_by: plan.source,
                expires_at: now + chrono::Duration::days(WARNING_DAYS),
            })),
            ModerationDecision::Uncertain | ModerationDecision::Ignore => None,
        })
    }

    /// Post-commit work. Never fails.
    async fn after_commit(&self, content: &ContentRef, settled: &Settled) {
        if settled.content_deactivated {
            self.invalidate_content_cache(content).await;
        }
        self.notify(settled).await;
    }

    /// Notification phase.
    async fn notify(&self, settled: &Settled) {
        let Some(ref publisher) = self.event_publisher else {
            return;
        };
        let report = &settled.report;

        if let Some(ref ban) = settled.ban {
            let event = ModerationEvent::BanUser(BanUserPayload::from(ban));
            if let Err(e) = publisher.publish_to_user(&ban.user_id, &event).await {
                warn!(error = %e, user_id = %ban.user_id, "Failed to publish ban event");
            }
            if let Err(e) = publisher.disconnect_user(&ban.user_id).await {
                warn!(error = %e, user_id = %ban.user_id, "Failed to disconnect banned user");
            }
        }

        if let Some(ref warning) = settled.warning {
            let event = ModerationEvent::WarnUser(WarnUserPayload::from(warning));
            if let Err(e) = publisher.publish_to_user(&warning.user_id, &event).await {
                warn!(error = %e, user_id = %warning.user_id, "Failed to publish warning event");
            }
        }

        let event = ModerationEvent::ReportStatusChanged(ReportStatusPayload {
            report_id: report.id.clone(),
            actions_taken: report.actions(),
            status: report.status,
        });
        if let Err(e) = publisher.publish_to_user(&report.reported_by, &event).await {
            warn!(
                error = %e,
                report_id = %report.id,
                user_id = %report.reported_by,
                "Failed to publish report status"
            );
        }
    }

    /// Drop cached copies of deactivated content. Best effort.
    async fn invalidate_content_cache(&self, content: &ContentRef) {
        if let Err(e) = self.cache.del(&content.cache_key()).await {
            warn!(error = %e, key = %content.cache_key(), "Failed to drop content cache");
        }

        let pattern = match content.target_type {
            TargetType::Question => Some("questions:*".to_string()),
            TargetType::Answer | TargetType::Reply => {
                match self.stores.content.find_content_meta(content).await {
                    Ok(meta) => meta.and_then(|m| m.parent_id).map(|parent| {
                        let prefix = if content.target_type == TargetType::Answer {
                            "answers"
                        } else {
                            "replies"
                        };
                        format!("{prefix}:{parent}*")
                    }),
                    Err(e) => {
                        warn!(error = %e, target_id = %content.target_id, "Failed to look up parent");
                        None
                    }
                }
            }
        };

        if let Some(pattern) = pattern {
            match self.cache.scan_delete(&pattern).await {
                Ok(removed) => debug!(pattern = %pattern, removed, "Dropped list caches"),
                Err(e) => warn!(error = %e, pattern = %pattern, "Failed to drop list caches"),
            }
        }
    }

    // ========== Queries ==========

    /// Get a report by id.
    pub async fn get_report(&self, report_id: &str) -> AppResult<report::Model> {
        self.stores
            .reports
            .find_report(report_id)
            .await?
            .ok_or_else(|| AppError::ReportNotFound(report_id.to_string()))
    }

    /// List reports, newest first.
    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<report::Model>> {
        self.stores
            .reports
            .list_reports(status, limit.clamp(1, MAX_LIST_LIMIT), offset)
            .await
    }

    /// Reports filed against a user, newest first.
    pub async fn reports_against_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<report::Model>> {
        self.stores
            .reports
            .reports_against_user(user_id, limit.clamp(1, MAX_LIST_LIMIT))
            .await
    }

    /// Bans issued against a user, newest first.
    pub async fn bans_for_user(&self, user_id: &str) -> AppResult<Vec<ban::Model>> {
        self.stores.identity.bans_for_user(user_id).await
    }

    // ========== Warnings ==========

    /// Mark a warning as seen. Only the warned user may do this.
    pub async fn acknowledge_warning(
        &self,
        user_id: &str,
        warning_id: &str,
    ) -> AppResult<warning::Model> {
        let warning = self
            .stores
            .identity
            .find_warning(warning_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warning {warning_id}")))?;

        if warning.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the warned user can acknowledge a warning".to_string(),
            ));
        }
        if warning.acknowledged_at.is_some() {
            return Ok(warning);
        }

        self.stores
            .identity
            .acknowledge_warning(warning_id, Utc::now())
            .await
    }

    // ========== Maintenance ==========

    /// Re-enqueue reports stuck in PENDING. Returns how many were queued.
    pub async fn requeue_stale_reports(
        &self,
        older_than: Duration,
        limit: u64,
    ) -> AppResult<usize> {
        let Some(ref queue) = self.report_queue else {
            return Ok(0);
        };

        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| AppError::Internal(e.to_string()))?;
        let stale = self
            .stores
            .reports
            .stale_pending_reports(cutoff, limit)
            .await?;

        let mut queued = 0;
        for report in &stale {
            match queue.enqueue(report).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(error = %e, report_id = %report.id, "Failed to requeue report"),
            }
        }

        if queued > 0 {
            info!(count = queued, "Requeued stale reports");
        }
        Ok(queued)
    }

    /// Return users whose suspensions have all expired to ACTIVE.
    pub async fn release_expired_suspensions(&self) -> AppResult<Vec<String>> {
        let released = self
            .stores
            .identity
            .release_expired_suspensions(Utc::now())
            .await?;

        for user_id in &released {
            info!(user_id = %user_id, "Suspension expired");
        }
        Ok(released)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::classifier::FixedClassifier;
    use crate::services::event_publisher::EventPublisher;
    use crate::services::report_queue::ReportQueue;
    use agora_common::MemoryCache;
    use agora_db::{ContentMeta, entities::user::AccountStatus, memory::InMemoryStore};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<(String, ModerationEvent)>>,
        disconnected: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish_to_user(&self, user_id: &str, event: &ModerationEvent) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Redis("connection refused".to_string()));
            }
            self.events
                .lock()
                .await
                .push((user_id.to_string(), event.clone()));
            Ok(())
        }

        async fn disconnect_user(&self, user_id: &str) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Redis("connection refused".to_string()));
            }
            self.disconnected.lock().await.push(user_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        queued: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReportQueue for RecordingQueue {
        async fn enqueue(&self, report: &report::Model) -> AppResult<()> {
            self.queued.lock().await.push(report.id.clone());
            Ok(())
        }
    }

    struct Harness {
        service: ModerationService,
        store: Arc<InMemoryStore>,
        cache: Arc<MemoryCache>,
        publisher: Arc<RecordingPublisher>,
        queue: Arc<RecordingQueue>,
    }

    async fn harness_with(classifier: FixedClassifier, publisher: RecordingPublisher) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let publisher = Arc::new(publisher);
        let queue = Arc::new(RecordingQueue::default());

        store.insert_user("author", false, false).await;
        store.insert_user("reporter", false, false).await;
        store.insert_user("admin", true, false).await;
        store.insert_user("mod", false, true).await;
        store
            .insert_content(
                ContentRef::new(TargetType::Question, "q1"),
                ContentMeta {
                    owner_id: "author".to_string(),
                    title: Some("Title".to_string()),
                    body: "Body".to_string(),
                    is_active: true,
                    parent_id: None,
                },
            )
            .await;

        let mut service = ModerationService::new(
            ModerationStores::shared(store.clone()),
            cache.clone(),
            Arc::new(classifier),
            Duration::from_millis(500),
        );
        service.set_event_publisher(publisher.clone());
        service.set_report_queue(queue.clone());

        Harness {
            service,
            store,
            cache,
            publisher,
            queue,
        }
    }

    async fn harness(classifier: FixedClassifier) -> Harness {
        harness_with(classifier, RecordingPublisher::default()).await
    }

    fn question_report() -> CreateReportInput {
        CreateReportInput {
            target_id: "q1".to_string(),
            target_user_id: "author".to_string(),
            target_type: TargetType::Question,
            report_reason: ReportReason::HateSpeech,
            report_comment: Some("This is hateful".to_string()),
        }
    }

    fn question() -> ContentRef {
        ContentRef::new(TargetType::Question, "q1")
    }

    #[tokio::test]
    async fn test_create_report_persists_and_enqueues() {
        let h = harness(FixedClassifier::failing("unused")).await;

        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.severity, 0);
        assert_eq!(report.decisions(), vec![AiDecision::Uncertain]);
        assert_eq!(*h.queue.queued.lock().await, vec![report.id.clone()]);
    }

    #[tokio::test]
    async fn test_mismatched_owner_is_rejected() {
        let h = harness(FixedClassifier::failing("unused")).await;
        let mut input = question_report();
        input.target_user_id = "someone_else".to_string();

        let err = h.service.create_report("reporter", input).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(h.store.reports().await.is_empty());
        assert!(h.queue.queued.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_self_report_and_bad_comment_are_rejected() {
        let h = harness(FixedClassifier::failing("unused")).await;

        let err = h
            .service
            .create_report("author", question_report())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let mut input = question_report();
        input.report_comment = Some("no".to_string());
        let err = h.service.create_report("reporter", input).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(h.store.reports().await.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_content_cannot_be_reported() {
        let h = harness(FixedClassifier::failing("unused")).await;
        h.store.set_active(&question(), false).await.unwrap();

        let err = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reporter_budget() {
        let h = harness(FixedClassifier::failing("unused")).await;
        for _ in 0..5 {
            h.service
                .create_report("reporter", question_report())
                .await
                .unwrap();
        }
        let err = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));
        assert_eq!(h.store.reports().await.len(), 5);
    }

    #[tokio::test]
    async fn test_hate_speech_terminates_author() {
        let h = harness(FixedClassifier::flagged("hate", 0.85)).await;
        h.cache
            .set("questions:recent", "[]", Duration::from_secs(60))
            .await
            .unwrap();
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        let outcome = h.service.process_report(&report.id).await.unwrap();

        assert!(matches!(
            outcome,
            ProcessOutcome::Settled {
                decision: ModerationDecision::BanUserPerm,
                status: ReportStatus::Resolved,
                ..
            }
        ));

        let stored = h.service.get_report(&report.id).await.unwrap();
        let decisions = stored.decisions();
        assert!(decisions.contains(&AiDecision::BanUserPerm));
        assert!(decisions.contains(&AiDecision::RemoveContent));
        assert_eq!(stored.ai_confidence, 0.85);
        assert!((90..=100).contains(&stored.severity));

        assert_eq!(
            h.store.user_status("author").await,
            Some(AccountStatus::Terminated)
        );
        let bans = h.store.bans().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].ban_type, BanType::Perm);
        assert_eq!(bans[0].title, PERM_BAN_TITLE);
        assert_eq!(h.store.is_content_active(&question()).await, Some(false));
        assert!(!h.cache.contains("questions:recent").await);

        let events = h.publisher.events.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "author");
        assert_eq!(events[0].1.name(), "banUser");
        assert_eq!(events[1].0, "reporter");
        assert_eq!(events[1].1.name(), "reportStatusChanged");
        assert_eq!(*h.publisher.disconnected.lock().await, vec!["author"]);
    }

    #[tokio::test]
    async fn test_low_confidence_warns_without_removal() {
        // Temp family at 0.1 scores 55: a warning, below the removal gate.
        let h = harness(FixedClassifier::flagged("violence", 0.1)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();

        let stored = h.service.get_report(&report.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Resolved);
        assert_eq!(stored.severity, 55);
        assert_eq!(stored.actions(), vec![ModerationAction::WarnUser]);
        assert_eq!(h.store.warnings().await.len(), 1);
        assert!(h.store.bans().await.is_empty());
        assert_eq!(
            h.store.user_status("author").await,
            Some(AccountStatus::Active)
        );
        assert_eq!(h.store.is_content_active(&question()).await, Some(true));
    }

    #[tokio::test]
    async fn test_temp_ban_suspends_for_computed_duration() {
        let h = harness(FixedClassifier::flagged("harassment", 0.5)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();

        let bans = h.store.bans().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].ban_type, BanType::Temp);
        // Severity 75 at confidence 0.5: (75 - 60) * 1.5 hours.
        assert_eq!(bans[0].duration_ms, Some(81_000_000));
        assert_eq!(
            h.store.user_status("author").await,
            Some(AccountStatus::Suspended)
        );
        assert_eq!(h.store.is_content_active(&question()).await, Some(false));
    }

    #[tokio::test]
    async fn test_classifier_failure_goes_to_review() {
        let h = harness(FixedClassifier::failing("quota exceeded")).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();

        let stored = h.service.get_report(&report.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Reviewing);
        assert_eq!(stored.decisions(), vec![AiDecision::Uncertain]);
        assert!(stored.actions().is_empty());
        assert!(h.store.bans().await.is_empty());
        assert!(h.store.warnings().await.is_empty());
    }

    #[tokio::test]
    async fn test_unflagged_content_is_dismissed() {
        let h = harness(FixedClassifier::scores(Default::default())).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();

        let stored = h.service.get_report(&report.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Dismissed);
        assert_eq!(stored.actions(), vec![ModerationAction::NoAction]);
    }

    #[tokio::test]
    async fn test_processing_twice_bans_once() {
        let h = harness(FixedClassifier::flagged("hate", 0.95)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();
        let second = h.service.process_report(&report.id).await.unwrap();

        assert_eq!(second, ProcessOutcome::Skipped);
        assert_eq!(h.store.bans().await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_report_pending() {
        let h = harness(FixedClassifier::flagged("hate", 0.95)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.store.set_fail_writes(true).await;
        assert!(h.service.process_report(&report.id).await.is_err());
        h.store.set_fail_writes(false).await;

        let stored = h.service.get_report(&report.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        assert!(h.store.bans().await.is_empty());
        assert!(h.publisher.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_ban() {
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let h = harness_with(FixedClassifier::flagged("hate", 0.95), publisher).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.service.process_report(&report.id).await.unwrap();

        assert_eq!(h.store.bans().await.len(), 1);
        assert_eq!(
            h.service.get_report(&report.id).await.unwrap().status,
            ReportStatus::Resolved
        );
    }

    async fn reviewing_report(h: &Harness) -> report::Model {
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();
        h.service.process_report(&report.id).await.unwrap();
        let stored = h.service.get_report(&report.id).await.unwrap();
        assert_eq!(stored.status, ReportStatus::Reviewing);
        stored
    }

    fn manual(
        report_id: &str,
        action: ModerationDecision,
        tier: SeverityTier,
    ) -> ModerateReportInput {
        ModerateReportInput {
            report_id: report_id.to_string(),
            action_taken: action,
            reasons: vec!["Repeated spam".to_string()],
            severity: tier,
            ban_duration_ms: None,
        }
    }

    #[tokio::test]
    async fn test_manual_temp_ban() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        let mut input = manual(&report.id, ModerationDecision::BanUserTemp, SeverityTier::Four);
        input.ban_duration_ms = Some(3_600_000);
        let settled = h.service.moderate_report("admin", input).await.unwrap();

        assert_eq!(settled.status, ReportStatus::Resolved);
        assert_eq!(settled.resolved_by.as_deref(), Some("admin"));
        assert_eq!(
            settled.actions(),
            vec![ModerationAction::BanUserTemp, ModerationAction::RemoveContent]
        );

        let bans = h.store.bans().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].banned_by, ModerationSource::AdminModeration);
        assert_eq!(bans[0].duration_ms, Some(3_600_000));
        assert_eq!(bans[0].reason_list(), vec!["Repeated spam"]);
        assert_eq!(
            h.store.user_status("author").await,
            Some(AccountStatus::Suspended)
        );
    }

    #[tokio::test]
    async fn test_manual_ignore_dismisses() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        let settled = h
            .service
            .moderate_report(
                "mod",
                manual(&report.id, ModerationDecision::Ignore, SeverityTier::One),
            )
            .await
            .unwrap();

        assert_eq!(settled.status, ReportStatus::Dismissed);
        assert_eq!(settled.actions(), vec![ModerationAction::NoAction]);
        assert_eq!(h.store.is_content_active(&question()).await, Some(true));
    }

    #[tokio::test]
    async fn test_manual_requires_moderator() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        let err = h
            .service
            .moderate_report(
                "reporter",
                manual(&report.id, ModerationDecision::WarnUser, SeverityTier::Three),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_manual_on_settled_report_conflicts() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        h.service
            .moderate_report(
                "admin",
                manual(&report.id, ModerationDecision::WarnUser, SeverityTier::Three),
            )
            .await
            .unwrap();
        let err = h
            .service
            .moderate_report(
                "mod",
                manual(&report.id, ModerationDecision::BanUserPerm, SeverityTier::Five),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(h.store.warnings().await.len(), 1);
        assert!(h.store.bans().await.is_empty());
    }

    #[tokio::test]
    async fn test_manual_temp_ban_needs_duration() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        let err = h
            .service
            .moderate_report(
                "admin",
                manual(&report.id, ModerationDecision::BanUserTemp, SeverityTier::Four),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_ban_duration_is_rejected_before_charging() {
        let h = harness(FixedClassifier::failing("down")).await;
        let report = reviewing_report(&h).await;

        let mut input = manual(&report.id, ModerationDecision::BanUserTemp, SeverityTier::Four);
        input.ban_duration_ms = Some(i64::MAX);
        let err = h.service.moderate_report("admin", input).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(h.store.bans().await.is_empty());
        assert!(!h.cache.contains("admin:admin:mod_points").await);
        assert_eq!(
            h.service.get_report(&report.id).await.unwrap().status,
            ReportStatus::Reviewing
        );
    }

    #[tokio::test]
    async fn test_content_lookup_failure_keeps_report_pending() {
        let h = harness(FixedClassifier::scores(Default::default())).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        h.store.set_fail_content_reads(true).await;
        assert!(h.service.process_report(&report.id).await.is_err());
        h.store.set_fail_content_reads(false).await;

        assert_eq!(
            h.service.get_report(&report.id).await.unwrap().status,
            ReportStatus::Pending
        );
        assert!(h.publisher.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_target_type_is_rejected() {
        let h = harness(FixedClassifier::flagged("hate", 0.95)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();

        let err = h
            .service
            .process_report_as(&report.id, Some(TargetType::Reply))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            h.service.get_report(&report.id).await.unwrap().status,
            ReportStatus::Pending
        );
        assert!(h.store.bans().await.is_empty());
    }

    #[tokio::test]
    async fn test_admin_point_limit_blocks_mutation() {
        let h = harness(FixedClassifier::failing("down")).await;
        h.cache
            .incr_with_expiry("admin:admin:mod_points", 15, Duration::from_secs(120))
            .await
            .unwrap();
        let report = reviewing_report(&h).await;

        let err = h
            .service
            .moderate_report(
                "admin",
                manual(&report.id, ModerationDecision::BanUserPerm, SeverityTier::Five),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimited(_)));
        assert!(h.store.bans().await.is_empty());
        assert_eq!(
            h.service.get_report(&report.id).await.unwrap().status,
            ReportStatus::Reviewing
        );
    }

    #[tokio::test]
    async fn test_acknowledge_warning() {
        let h = harness(FixedClassifier::flagged("violence", 0.1)).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();
        h.service.process_report(&report.id).await.unwrap();
        let warning = h.store.warnings().await.remove(0);

        let err = h
            .service
            .acknowledge_warning("reporter", &warning.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let acked = h
            .service
            .acknowledge_warning("author", &warning.id)
            .await
            .unwrap();
        assert!(acked.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn test_requeue_only_stale_pending() {
        let h = harness(FixedClassifier::failing("unused")).await;
        let report = h
            .service
            .create_report("reporter", question_report())
            .await
            .unwrap();
        h.queue.queued.lock().await.clear();

        let mut old = report.clone();
        old.created_at = (Utc::now() - chrono::Duration::hours(1)).into();
        h.store.put_report(old).await;

        let queued = h
            .service
            .requeue_stale_reports(Duration::from_secs(600), 100)
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert_eq!(*h.queue.queued.lock().await, vec![report.id]);

        let none = h
            .service
            .requeue_stale_reports(Duration::from_secs(7200), 100)
            .await
            .unwrap();
        assert_eq!(none, 0);
    }
}
