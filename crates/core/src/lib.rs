//! Core business logic for agora moderation.
//!
//! Report intake, classification, severity scoring, point limiting and
//! trust-state enforcement. Storage, caching, queueing and event delivery
//! are consumed through traits so the same logic runs against sea-orm and
//! Redis in production and in-memory fakes in tests.

pub mod services;

pub use services::*;
