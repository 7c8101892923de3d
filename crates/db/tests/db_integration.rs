//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test -p agora-db --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `agora_test`)
//!   `TEST_DB_PASSWORD` (default: `agora_test`)

#![allow(clippy::unwrap_used)]

use agora_db::entities::{
    ban::{BanType, ModerationSource, SeverityTier},
    report::{self, AiDecision, ModerationAction, ReportReason, ReportStatus, TargetType},
    user::AccountStatus,
};
use agora_db::repositories::{
    ContentRepository, EnforcementRepository, ReportRepository, UserRepository,
};
use agora_db::test_utils::TestDatabase;
use agora_db::{
    CommitOutcome, ContentRef, ContentStore, EnforcementCommit, EnforcementStore, IdentityStore,
    NewBan, ReportResolution, ReportStore, Sanction,
};
use chrono::Utc;
use std::sync::Arc;

fn pending_report(id: &str) -> report::Model {
    report::Model {
        id: id.to_string(),
        reported_by: "reporter".to_string(),
        target_id: "q1".to_string(),
        target_type: TargetType::Question,
        target_user_id: "author".to_string(),
        report_reason: ReportReason::HateSpeech,
        report_comment: None,
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
    }
}

fn perm_ban_commit(ban_id: &str) -> EnforcementCommit {
    EnforcementCommit {
        report_id: "r1".to_string(),
        expected_status: ReportStatus::Pending,
        resolution: ReportResolution {
            status: ReportStatus::Resolved,
            severity: 93,
            ai_decisions: Some(vec![AiDecision::BanUserPerm, AiDecision::RemoveContent]),
            ai_confidence: Some(0.85),
            ai_reasons: Some(vec!["Hate/harassment detected".to_string()]),
            actions_taken: vec![ModerationAction::BanUserPerm, ModerationAction::RemoveContent],
            admin_reasons: None,
            resolved_by: None,
        },
        sanction: Some(Sanction::Ban(NewBan {
            id: ban_id.to_string(),
            user_id: "author".to_string(),
            report_id: Some("r1".to_string()),
            title: "Permanent Account Suspension".to_string(),
            reasons: vec!["Hate/harassment detected".to_string()],
            ban_type: BanType::Perm,
            severity: SeverityTier::Five,
            banned_by: ModerationSource::AiModeration,
            expires_at: None,
            duration_ms: None,
        })),
        deactivate: Some(ContentRef::new(TargetType::Question, "q1")),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_enforcement_commit_is_atomic_and_idempotent() {
    let db = TestDatabase::create().await.unwrap();
    db.seed_user("author", false).await.unwrap();
    db.seed_user("reporter", false).await.unwrap();
    db.seed_question("q1", "author", "some hateful text").await.unwrap();

    let conn = Arc::new(db.connection().clone());
    let reports = ReportRepository::new(conn.clone());
    let users = UserRepository::new(conn.clone());
    let content = ContentRepository::new(conn.clone());
    let enforcement = EnforcementRepository::new(conn);

    reports.create_report(pending_report("r1")).await.unwrap();

    let first = enforcement.commit(perm_ban_commit("b1")).await.unwrap();
    let second = enforcement.commit(perm_ban_commit("b2")).await.unwrap();

    assert!(matches!(first, CommitOutcome::Applied { .. }));
    assert!(matches!(second, CommitOutcome::AlreadySettled));
    assert_eq!(users.bans_for_user("author").await.unwrap().len(), 1);
    assert_eq!(
        users.find_user("author").await.unwrap().unwrap().status,
        AccountStatus::Terminated
    );
    let meta = content
        .find_content_meta(&ContentRef::new(TargetType::Question, "q1"))
        .await
        .unwrap()
        .unwrap();
    assert!(!meta.is_active);

    let settled = reports.find_report("r1").await.unwrap().unwrap();
    assert_eq!(settled.status, ReportStatus::Resolved);
    assert_eq!(settled.severity, 93);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_failed_sanction_rolls_back_report_update() {
    let db = TestDatabase::create().await.unwrap();
    db.seed_user("reporter", false).await.unwrap();
    db.seed_user("author", false).await.unwrap();
    db.seed_question("q1", "author", "text").await.unwrap();

    let conn = Arc::new(db.connection().clone());
    let reports = ReportRepository::new(conn.clone());
    let enforcement = EnforcementRepository::new(conn);
    reports.create_report(pending_report("r1")).await.unwrap();

    // Ban for a user that does not exist violates the foreign key.
    let mut commit = perm_ban_commit("b1");
    if let Some(Sanction::Ban(ban)) = commit.sanction.as_mut() {
        ban.user_id = "ghost".to_string();
    }

    assert!(enforcement.commit(commit).await.is_err());
    let report = reports.find_report("r1").await.unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Pending);

    db.drop_database().await.unwrap();
}
