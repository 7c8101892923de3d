//! Test utilities for database-backed suites.
//!
//! Integration tests get a throwaway `PostgreSQL` database with the schema
//! applied, plus seeding helpers for the rows moderation needs.

use crate::entities::{question, user};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Set,
    Statement,
};
use tracing::info;

/// Connection settings for the test database server.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: env_or("TEST_DB_HOST", "localhost"),
            port: env_or("TEST_DB_PORT", "5433").parse().unwrap_or(5433),
            username: env_or("TEST_DB_USER", "agora_test"),
            password: env_or("TEST_DB_PASSWORD", "agora_test"),
        }
    }
}

impl TestDbConfig {
    /// URL of a named database on the test server.
    #[must_use]
    pub fn url_for(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{database}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Redis endpoint for queue and pub/sub integration suites.
#[must_use]
pub fn test_redis_url() -> String {
    std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6380".to_string())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A uniquely named, migrated database dropped by [`TestDatabase::drop_database`].
pub struct TestDatabase {
    /// Database connection.
    pub conn: DatabaseConnection,
    config: TestDbConfig,
    name: String,
}

impl TestDatabase {
    /// Create a fresh database and run every migration against it.
    pub async fn create() -> Result<Self, DbErr> {
        use sea_orm_migration::MigratorTrait;

        let config = TestDbConfig::default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("agora_test_{}", &suffix[..8]);

        let admin = Database::connect(&config.url_for("postgres")).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("CREATE DATABASE \"{name}\""),
            ))
            .await?;
        admin.close().await?;

        let conn = Database::connect(&config.url_for(&name)).await?;
        crate::migrations::Migrator::up(&conn, None).await?;

        info!(database = %name, "Created migrated test database");
        Ok(Self { conn, config, name })
    }

    /// Get the database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Insert a user.
    pub async fn seed_user(&self, id: &str, is_admin: bool) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            id: Set(id.to_string()),
            username: Set(format!("user_{id}")),
            is_admin: Set(is_admin),
            is_moderator: Set(false),
            status: Set(user::AccountStatus::Active),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
        .insert(&self.conn)
        .await
    }

    /// Insert an active question owned by `user_id`.
    pub async fn seed_question(
        &self,
        id: &str,
        user_id: &str,
        body: &str,
    ) -> Result<question::Model, DbErr> {
        question::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            title: Set(format!("Question {id}")),
            body: Set(body.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
        .insert(&self.conn)
        .await
    }

    /// Drop the database. Consumes self because the connection must close first.
    pub async fn drop_database(self) -> Result<(), DbErr> {
        self.conn.close().await?;

        let admin = Database::connect(&self.config.url_for("postgres")).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
                    self.name
                ),
            ))
            .await
            .ok();
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("DROP DATABASE IF EXISTS \"{}\"", self.name),
            ))
            .await?;
        admin.close().await?;

        info!(database = %self.name, "Dropped test database");
        Ok(())
    }
}
