//! Common utilities and shared types for agora.
//!
//! This crate provides foundational components used across all agora crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Cache**: Key-value cache with TTL, pattern delete and atomic counters via [`CacheStore`]
//!
//! # Example
//!
//! ```no_run
//! use agora_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     println!("{} workers, report id {}", config.moderation.worker_concurrency, id_gen.generate());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod id;

pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
