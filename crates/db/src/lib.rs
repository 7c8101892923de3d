//! Database layer for agora.
//!
//! Entities and migrations for users, content, reports, bans and warnings,
//! the storage traits the moderation pipeline consumes, and their sea-orm
//! implementations.

pub mod entities;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod migrations;
pub mod repositories;
pub mod stores;
pub mod test_utils;

use agora_common::{AppError, Config};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::log::LevelFilter;

pub use stores::{
    CommitOutcome, ContentMeta, ContentRef, ContentStore, EnforcementCommit, EnforcementStore,
    IdentityStore, NewBan, NewWarning, ReportResolution, ReportStore, Sanction,
};

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}
