//! Presence directory shared by every server process.
//!
//! Maps a user to the ids of their live connections. A connection id is only
//! meaningful to the process holding the socket; other processes use the
//! directory to learn which connections exist at all.
//!
//! Redis layout:
//! - `online:users` set of users with at least one connection
//! - `online:user:{userId}` set of connection ids
//! - `socket:{connectionId}` owning user id

#![allow(missing_docs)]

use agora_common::AppResult;
use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::{KeysInterface, SetsInterface};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Redis key names.
pub mod keys {
    /// Set of online user ids.
    pub const ONLINE_USERS: &str = "online:users";

    /// Set of connection ids for a user.
    #[must_use]
    pub fn user_connections(user_id: &str) -> String {
        format!("online:user:{user_id}")
    }

    /// Owner of a connection.
    #[must_use]
    pub fn connection_owner(connection_id: &str) -> String {
        format!("socket:{connection_id}")
    }
}

/// Directory of live connections.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// Record a new connection for a user.
    async fn register_connection(&self, user_id: &str, connection_id: &str) -> AppResult<()>;

    /// Connection ids currently registered for a user.
    async fn list_connections(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Remove a connection. Returns the user it belonged to, if known.
    async fn unregister_connection(&self, connection_id: &str) -> AppResult<Option<String>>;

    /// Users with at least one connection.
    async fn online_users(&self) -> AppResult<Vec<String>>;
}

/// Presence directory in Redis.
#[derive(Clone)]
pub struct RedisPresence {
    redis: Arc<RedisClient>,
}

impl RedisPresence {
    /// Create a new Redis presence directory.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl PresenceDirectory for RedisPresence {
    async fn register_connection(&self, user_id: &str, connection_id: &str) -> AppResult<()> {
        self.redis
            .set::<(), _, _>(
                keys::connection_owner(connection_id),
                user_id,
                None,
                None,
                false,
            )
            .await?;
        let _: i64 = self
            .redis
            .sadd(keys::user_connections(user_id), connection_id)
            .await?;
        let _: i64 = self.redis.sadd(keys::ONLINE_USERS, user_id).await?;

        debug!(user_id = %user_id, connection_id = %connection_id, "Registered connection");
        Ok(())
    }

    async fn list_connections(&self, user_id: &str) -> AppResult<Vec<String>> {
        let connections: Vec<String> = self.redis.smembers(keys::user_connections(user_id)).await?;
        Ok(connections)
    }

    async fn unregister_connection(&self, connection_id: &str) -> AppResult<Option<String>> {
        let owner_key = keys::connection_owner(connection_id);
        let user_id: Option<String> = self.redis.get(&owner_key).await?;
        let _: i64 = self.redis.del(&owner_key).await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let user_key = keys::user_connections(&user_id);
        let _: i64 = self.redis.srem(&user_key, connection_id).await?;
        let remaining: i64 = self.redis.scard(&user_key).await?;
        if remaining == 0 {
            let _: i64 = self.redis.srem(keys::ONLINE_USERS, &user_id).await?;
        }

        debug!(user_id = %user_id, connection_id = %connection_id, "Unregistered connection");
        Ok(Some(user_id))
    }

    async fn online_users(&self) -> AppResult<Vec<String>> {
        let users: Vec<String> = self.redis.smembers(keys::ONLINE_USERS).await?;
        Ok(users)
    }
}

#[derive(Debug, Default)]
struct MemoryPresenceState {
    by_user: BTreeMap<String, BTreeSet<String>>,
    owners: BTreeMap<String, String>,
}

/// In-process presence directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresence {
    state: Arc<Mutex<MemoryPresenceState>>,
}

impl MemoryPresence {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceDirectory for MemoryPresence {
    async fn register_connection(&self, user_id: &str, connection_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .owners
            .insert(connection_id.to_string(), user_id.to_string());
        state
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        Ok(())
    }

    async fn list_connections(&self, user_id: &str) -> AppResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn unregister_connection(&self, connection_id: &str) -> AppResult<Option<String>> {
        let mut state = self.state.lock().await;
        let Some(user_id) = state.owners.remove(connection_id) else {
            return Ok(None);
        };

        if let Some(ids) = state.by_user.get_mut(&user_id) {
            ids.remove(connection_id);
            if ids.is_empty() {
                state.by_user.remove(&user_id);
            }
        }
        Ok(Some(user_id))
    }

    async fn online_users(&self) -> AppResult<Vec<String>> {
        Ok(self.state.lock().await.by_user.keys().cloned().collect())
    }
}
