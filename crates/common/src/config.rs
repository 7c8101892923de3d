//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Moderation pipeline configuration.
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// Real-time delivery configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
}

/// Moderation pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// Number of report jobs processed concurrently per worker process.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Extra attempts for a failed job before it is left in the dead-letter set.
    #[serde(default)]
    pub max_retries: usize,
    /// Upper bound for a single classifier call.
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,
    /// API key for the moderation endpoint. Without it every report goes to human review.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// Moderation model name.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Moderation endpoint URL.
    #[serde(default = "default_openai_endpoint")]
    pub openai_endpoint: String,
    /// Age after which a still-pending report is enqueued again.
    #[serde(default = "default_requeue_after_secs")]
    pub requeue_after_secs: u64,
    /// How often the stale-report sweep runs.
    #[serde(default = "default_requeue_interval_secs")]
    pub requeue_interval_secs: u64,
    /// How often expired suspensions are lifted.
    #[serde(default = "default_suspension_sweep_interval_secs")]
    pub suspension_sweep_interval_secs: u64,
    /// Push every dead-lettered job back onto the queue at startup.
    #[serde(default)]
    pub replay_dead_letters_on_start: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            max_retries: 0,
            classifier_timeout_secs: default_classifier_timeout_secs(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            openai_endpoint: default_openai_endpoint(),
            requeue_after_secs: default_requeue_after_secs(),
            requeue_interval_secs: default_requeue_interval_secs(),
            suspension_sweep_interval_secs: default_suspension_sweep_interval_secs(),
            replay_dead_letters_on_start: false,
        }
    }
}

impl ModerationConfig {
    /// Classifier timeout as a [`Duration`].
    #[must_use]
    pub const fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }
}

/// Real-time delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Whether this process subscribes to the socket channels.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_worker_concurrency() -> usize {
    20
}

const fn default_classifier_timeout_secs() -> u64 {
    10
}

fn default_openai_model() -> String {
    "omni-moderation-latest".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1/moderations".to_string()
}

const fn default_requeue_after_secs() -> u64 {
    600
}

const fn default_requeue_interval_secs() -> u64 {
    300
}

const fn default_suspension_sweep_interval_secs() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `AGORA_ENV`)
    /// 4. Environment variables with `AGORA__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("AGORA_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderation_defaults() {
        let config = ModerationConfig::default();
        assert_eq!(config.worker_concurrency, 20);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.classifier_timeout(), Duration::from_secs(10));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = config::Config::builder()
            .set_override("database.url", "postgres://localhost/agora")
            .and_then(|b| b.set_override("redis.url", "redis://localhost:6379"))
            .and_then(config::ConfigBuilder::<config::builder::DefaultState>::build)
            .and_then(config::Config::try_deserialize)
            .unwrap_or_else(|e| panic!("config should deserialize: {e}"));

        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.moderation.worker_concurrency, 20);
        assert!(config.realtime.enabled);
    }
}
