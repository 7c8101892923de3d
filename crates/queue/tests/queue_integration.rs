//! Queue integration tests.
//!
//! These tests run the worker, pub/sub fan-out and scheduler together over
//! in-memory stores, with two fan-outs standing in for two server processes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use agora_common::{AppResult, MemoryCache};
use agora_core::{
    CreateReportInput, FixedClassifier, ModerationService, ModerationStores, ProcessOutcome,
};
use agora_db::{
    ContentMeta, ContentRef,
    entities::{
        report::{ReportReason, ReportStatus, TargetType},
        user::AccountStatus,
    },
    memory::InMemoryStore,
};
use agora_queue::{
    ConnectionHub, DeadLetterSet, LocalPubSub, MaintenanceExecutor, MemoryDeadLetters,
    MemoryPresence, ModerationJobSink, ModerationWorkerContext, OutboundMessage,
    PresenceDirectory, PresenceFanout, ReportModerationJob, handle_report_job,
    replay_dead_letters,
};
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_user("author", false, false).await;
    store.insert_user("reporter", false, false).await;
    store
        .insert_content(
            ContentRef::new(TargetType::Question, "q1"),
            ContentMeta {
                owner_id: "author".to_string(),
                title: Some("How do I".to_string()),
                body: "Question body".to_string(),
                is_active: true,
                parent_id: None,
            },
        )
        .await;
    store
}

fn service(store: &Arc<InMemoryStore>, classifier: FixedClassifier) -> ModerationService {
    ModerationService::new(
        ModerationStores::shared(store.clone()),
        Arc::new(MemoryCache::new()),
        Arc::new(classifier),
        Duration::from_millis(500),
    )
}

fn question_report() -> CreateReportInput {
    CreateReportInput {
        target_id: "q1".to_string(),
        target_user_id: "author".to_string(),
        target_type: TargetType::Question,
        report_reason: ReportReason::HateSpeech,
        report_comment: Some("hateful question".to_string()),
    }
}

async fn next(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> OutboundMessage {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for socket message")
        .expect("connection channel closed")
}

#[derive(Default)]
struct CollectingQueue {
    jobs: Mutex<Vec<ReportModerationJob>>,
}

#[async_trait]
impl ModerationJobSink for CollectingQueue {
    async fn push_job(&self, job: ReportModerationJob) -> AppResult<()> {
        self.jobs.lock().await.push(job);
        Ok(())
    }
}

#[async_trait]
impl agora_core::ReportQueue for CollectingQueue {
    async fn enqueue(&self, report: &agora_db::entities::report::Model) -> AppResult<()> {
        self.push_job(ReportModerationJob::from_report(report)).await
    }
}

#[tokio::test]
async fn test_ban_reaches_author_on_another_process() {
    let store = seeded_store().await;
    let bus = LocalPubSub::new();
    let mut moderation = service(&store, FixedClassifier::flagged("hate", 0.85));
    moderation.set_event_publisher(Arc::new(bus.clone()));
    let ctx = ModerationWorkerContext::new(
        Arc::new(moderation),
        Arc::new(MemoryDeadLetters::new()),
    );

    let presence: Arc<dyn PresenceDirectory> = Arc::new(MemoryPresence::new());
    let process_a = PresenceFanout::new(presence.clone(), ConnectionHub::new());
    let process_b = PresenceFanout::new(presence.clone(), ConnectionHub::new());
    let (_, mut author_rx) = process_a.open_connection("author").await.unwrap();
    let (_, mut reporter_rx) = process_b.open_connection("reporter").await.unwrap();
    let _a = process_a.clone().spawn(bus.subscribe_local());
    let _b = process_b.clone().spawn(bus.subscribe_local());

    let report = ctx
        .service
        .create_report("reporter", question_report())
        .await
        .unwrap();
    let outcome = handle_report_job(&ReportModerationJob::from_report(&report), &ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Settled { .. }));

    match next(&mut author_rx).await {
        OutboundMessage::Event { event, payload } => {
            assert_eq!(event, "banUser");
            assert_eq!(payload["banType"], "PERM");
            assert_eq!(payload["userId"], "author");
        }
        other => panic!("expected banUser, got {other:?}"),
    }
    assert_eq!(next(&mut author_rx).await, OutboundMessage::Close);

    match next(&mut reporter_rx).await {
        OutboundMessage::Event { event, payload } => {
            assert_eq!(event, "reportStatusChanged");
            assert_eq!(payload["status"], "RESOLVED");
        }
        other => panic!("expected reportStatusChanged, got {other:?}"),
    }

    assert_eq!(
        store.user_status("author").await,
        Some(AccountStatus::Terminated)
    );
    assert_eq!(
        store
            .is_content_active(&ContentRef::new(TargetType::Question, "q1"))
            .await,
        Some(false)
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(presence.online_users().await.unwrap(), vec!["reporter"]);
}

#[tokio::test]
async fn test_dead_letter_replay_recovers_failed_job() {
    let store = seeded_store().await;
    let dead_letters = Arc::new(MemoryDeadLetters::new());
    let ctx = ModerationWorkerContext::new(
        Arc::new(service(&store, FixedClassifier::flagged("hate", 0.85))),
        dead_letters.clone(),
    );

    let report = ctx
        .service
        .create_report("reporter", question_report())
        .await
        .unwrap();
    let job = ReportModerationJob::from_report(&report);

    store.set_fail_writes(true).await;
    assert!(handle_report_job(&job, &ctx).await.is_err());
    assert!(handle_report_job(&job, &ctx).await.is_err());
    let entries = dead_letters.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 2);
    assert_eq!(store.reports().await[0].status, ReportStatus::Pending);

    store.set_fail_writes(false).await;
    let queue = CollectingQueue::default();
    assert_eq!(replay_dead_letters(dead_letters.as_ref(), &queue).await.unwrap(), 1);

    for replayed in queue.jobs.lock().await.iter() {
        handle_report_job(replayed, &ctx).await.unwrap();
    }

    assert!(dead_letters.entries().await.unwrap().is_empty());
    assert_eq!(store.reports().await[0].status, ReportStatus::Resolved);
    assert_eq!(store.bans().await.len(), 1);
}

#[tokio::test]
async fn test_stale_pending_reports_are_requeued() {
    let store = seeded_store().await;
    let queue = Arc::new(CollectingQueue::default());
    let mut moderation = service(&store, FixedClassifier::scores(Default::default()));
    moderation.set_report_queue(queue.clone());

    moderation
        .create_report("reporter", question_report())
        .await
        .unwrap();
    queue.jobs.lock().await.clear();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let requeued = MaintenanceExecutor::requeue_stale_reports(&moderation, Duration::ZERO, 10)
        .await
        .unwrap();

    assert_eq!(requeued, 1);
    assert_eq!(queue.jobs.lock().await.len(), 1);
}
