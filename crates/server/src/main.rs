//! Agora moderation worker entry point.
//!
//! Runs the report moderation worker pool, the socket fan-out for this
//! process and the maintenance scheduler until SIGINT or SIGTERM.

use std::sync::Arc;

use agora_common::{CacheStore, Config, RedisCache};
use agora_core::{
    ContentClassifier, ModerationService, ModerationStores, OpenAiModerationClient,
    UnconfiguredClassifier,
};
use agora_db::repositories::{
    ContentRepository, EnforcementRepository, ReportRepository, UserRepository,
};
use agora_queue::{
    ConnectionHub, DeadLetterSet, PresenceFanout, REPORT_MODERATION_QUEUE, RedisDeadLetters,
    RedisPresence, RedisPubSub, RedisReportQueue, ReportModerationJob, SchedulerConfig,
    replay_dead_letters, run_scheduler,
    workers::{ModerationWorkerContext, report_moderation_worker},
};
use apalis::layers::retry::RetryPolicy;
use apalis::prelude::*;
use fred::prelude::*;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn classifier(config: &Config) -> Arc<dyn ContentClassifier> {
    let moderation = &config.moderation;
    match moderation.openai_api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(OpenAiModerationClient::new(
            key.to_string(),
            moderation.openai_model.clone(),
            moderation.openai_endpoint.clone(),
        )),
        _ => {
            warn!("No moderation API key configured, every report will go to human review");
            Arc::new(UnconfiguredClassifier)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug".into()),
        )
        .init();

    info!("Starting agora moderation worker...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(agora_db::init(&config).await?);
    info!("Connected to database");

    info!("Running database migrations...");
    agora_db::migrate(&db).await?;
    info!("Migrations completed");

    // Job queue storage
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let redis_storage = apalis_redis::RedisStorage::<ReportModerationJob>::new(redis_conn);
    info!("Connected to Redis job queue");

    // fred client for cache, limiters, presence and dead letters
    let fred_config = fred::types::config::Config::from_url(&config.redis.url)?;
    let fred_client = fred::clients::Client::new(fred_config, None, None, None);
    fred_client.connect();
    fred_client.wait_for_connect().await?;
    let fred_client = Arc::new(fred_client);
    info!("Connected to Redis for cache and presence");

    let cache: Arc<dyn CacheStore> = Arc::new(RedisCache::new(fred_client.clone()));
    let stores = ModerationStores {
        content: Arc::new(ContentRepository::new(db.clone())),
        identity: Arc::new(UserRepository::new(db.clone())),
        reports: Arc::new(ReportRepository::new(db.clone())),
        enforcement: Arc::new(EnforcementRepository::new(db.clone())),
    };

    let report_queue = Arc::new(RedisReportQueue::new(redis_storage.clone()));
    let mut moderation_service = ModerationService::new(
        stores,
        cache,
        classifier(&config),
        config.moderation.classifier_timeout(),
    );
    moderation_service.set_report_queue(report_queue.clone());

    // Real-time delivery
    let pubsub = if config.realtime.enabled {
        let pubsub = RedisPubSub::new(&config.redis.url).await?;
        pubsub.start().await?;

        let presence = Arc::new(RedisPresence::new(fred_client.clone()));
        let fanout = PresenceFanout::new(presence, ConnectionHub::new());
        fanout.spawn(pubsub.subscribe_local());

        moderation_service.set_event_publisher(Arc::new(pubsub.clone()));
        info!("Real-time fan-out started");
        Some(pubsub)
    } else {
        info!("Real-time delivery disabled");
        None
    };

    let moderation_service = Arc::new(moderation_service);
    let dead_letters: Arc<dyn DeadLetterSet> = Arc::new(RedisDeadLetters::new(fred_client));

    if config.moderation.replay_dead_letters_on_start {
        match replay_dead_letters(dead_letters.as_ref(), report_queue.as_ref()).await {
            Ok(count) => info!(count, "Dead letters replayed"),
            Err(e) => warn!(error = %e, "Failed to replay dead letters"),
        }
    }

    // Maintenance tasks
    let scheduler_tasks = run_scheduler(
        &SchedulerConfig::from(&config.moderation),
        moderation_service.clone(),
    );
    info!("Scheduler started");

    // Worker pool
    let worker_ctx = ModerationWorkerContext::new(moderation_service, dead_letters);
    let concurrency = config.moderation.worker_concurrency;
    let monitor = Monitor::new().register({
        WorkerBuilder::new(REPORT_MODERATION_QUEUE)
            .enable_tracing()
            .concurrency(concurrency)
            .retry(RetryPolicy::retries(config.moderation.max_retries))
            .data(worker_ctx)
            .backend(redis_storage)
            .build_fn(report_moderation_worker)
    });
    info!(concurrency, "Report moderation worker started");

    monitor
        .run_with_signal(async {
            shutdown_signal().await;
            Ok(())
        })
        .await?;

    for task in scheduler_tasks {
        task.abort();
    }
    if let Some(pubsub) = pubsub {
        pubsub.shutdown().await?;
    }

    info!("Worker shutdown complete");
    Ok(())
}
