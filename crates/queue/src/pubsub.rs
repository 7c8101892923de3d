//! Redis Pub/Sub for cross-process delivery of moderation events.
//!
//! Every process publishes to and subscribes to the same two channels. What
//! arrives is forwarded to a local broadcast channel, where the fan-out picks
//! it up and delivers to the connections this process owns.

#![allow(missing_docs)]

use async_trait::async_trait;
use agora_common::{AppError, AppResult};
use agora_core::{EventPublisher, ModerationEvent};
use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Pub/Sub channel names.
pub mod channels {
    /// Events for a user's live connections.
    pub const SOCKET_EMIT: &str = "socket:emit";
    /// Requests to close a user's live connections.
    pub const SOCKET_DISCONNECT: &str = "socket:disconnect";
}

/// Body of a `socket:emit` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEmit {
    pub user_id: String,
    pub event: String,
    pub payload: Value,
}

/// Body of a `socket:disconnect` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketDisconnect {
    pub user_id: String,
}

/// A message received on one of the socket channels.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketMessage {
    Emit(SocketEmit),
    Disconnect(SocketDisconnect),
}

impl SocketMessage {
    /// Build an emit message for a moderation event.
    pub fn emit(user_id: &str, event: &ModerationEvent) -> AppResult<Self> {
        Ok(Self::Emit(SocketEmit {
            user_id: user_id.to_string(),
            event: event.name().to_string(),
            payload: event.payload()?,
        }))
    }

    /// Build a disconnect message.
    #[must_use]
    pub fn disconnect(user_id: &str) -> Self {
        Self::Disconnect(SocketDisconnect {
            user_id: user_id.to_string(),
        })
    }

    /// Channel the message travels on.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::Emit(_) => channels::SOCKET_EMIT,
            Self::Disconnect(_) => channels::SOCKET_DISCONNECT,
        }
    }

    /// Target user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Emit(m) => &m.user_id,
            Self::Disconnect(m) => &m.user_id,
        }
    }

    /// Decode a raw message by the channel it arrived on.
    pub fn decode(channel: &str, raw: &str) -> Result<Self, serde_json::Error> {
        match channel {
            channels::SOCKET_DISCONNECT => serde_json::from_str(raw).map(Self::Disconnect),
            _ => serde_json::from_str(raw).map(Self::Emit),
        }
    }

    /// Encode the body for publishing.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Emit(m) => serde_json::to_string(m),
            Self::Disconnect(m) => serde_json::to_string(m),
        }
    }
}

/// Redis Pub/Sub manager for socket events.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    /// Local broadcast channel for messages received from Redis.
    local_tx: broadcast::Sender<SocketMessage>,
}

impl RedisPubSub {
    /// Create a new Redis Pub/Sub manager.
    pub async fn new(redis_url: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        let (local_tx, _) = broadcast::channel(1000);

        info!("Redis Pub/Sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            local_tx,
        })
    }

    /// Subscribe to the socket channels and start the receive loop.
    pub async fn start(&self) -> Result<(), RedisError> {
        self.subscriber.subscribe(channels::SOCKET_EMIT).await?;
        self.subscriber.subscribe(channels::SOCKET_DISCONNECT).await?;

        info!("Subscribed to Redis Pub/Sub channels");

        let local_tx = self.local_tx.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                let Some(payload) = message.value.as_string() else {
                    continue;
                };
                let channel = message.channel.to_string();
                match SocketMessage::decode(&channel, &payload) {
                    Ok(decoded) => {
                        debug!(
                            channel = %channel,
                            user_id = %decoded.user_id(),
                            "Received Pub/Sub message"
                        );
                        if local_tx.send(decoded).is_err() {
                            warn!("No local subscribers for Pub/Sub message");
                        }
                    }
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Failed to parse Pub/Sub message");
                    }
                }
            }
            info!("Pub/Sub message stream ended");
        });

        Ok(())
    }

    /// Publish a message on its channel.
    pub async fn publish(&self, message: &SocketMessage) -> Result<(), RedisError> {
        let payload = message.encode().map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let _: () = self.publisher.publish(message.channel(), payload).await?;
        debug!(
            channel = message.channel(),
            user_id = %message.user_id(),
            "Published Pub/Sub message"
        );
        Ok(())
    }

    /// Get a receiver for messages arriving from Redis.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<SocketMessage> {
        self.local_tx.subscribe()
    }

    /// Get the number of local subscribers.
    #[must_use]
    pub fn local_subscriber_count(&self) -> usize {
        self.local_tx.receiver_count()
    }

    /// Shutdown the Pub/Sub manager.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisPubSub {
    async fn publish_to_user(&self, user_id: &str, event: &ModerationEvent) -> AppResult<()> {
        self.publish(&SocketMessage::emit(user_id, event)?)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }

    async fn disconnect_user(&self, user_id: &str) -> AppResult<()> {
        self.publish(&SocketMessage::disconnect(user_id))
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }
}

/// In-process bus with the same shape as [`RedisPubSub`], for single-process runs and tests.
#[derive(Clone)]
pub struct LocalPubSub {
    local_tx: broadcast::Sender<SocketMessage>,
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalPubSub {
    /// Create a new local bus.
    #[must_use]
    pub fn new() -> Self {
        let (local_tx, _) = broadcast::channel(1000);
        Self { local_tx }
    }

    /// Get a receiver for published messages.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<SocketMessage> {
        self.local_tx.subscribe()
    }

    fn send(&self, message: SocketMessage) {
        if self.local_tx.send(message).is_err() {
            debug!("No local subscribers for message");
        }
    }
}

#[async_trait]
impl EventPublisher for LocalPubSub {
    async fn publish_to_user(&self, user_id: &str, event: &ModerationEvent) -> AppResult<()> {
        self.send(SocketMessage::emit(user_id, event)?);
        Ok(())
    }

    async fn disconnect_user(&self, user_id: &str) -> AppResult<()> {
        self.send(SocketMessage::disconnect(user_id));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::ReportStatusPayload;
    use agora_db::entities::report::{ModerationAction, ReportStatus};

    fn status_event() -> ModerationEvent {
        ModerationEvent::ReportStatusChanged(ReportStatusPayload {
            report_id: "r1".to_string(),
            actions_taken: vec![ModerationAction::NoAction],
            status: ReportStatus::Dismissed,
        })
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(channels::SOCKET_EMIT, "socket:emit");
        assert_eq!(channels::SOCKET_DISCONNECT, "socket:disconnect");
    }

    #[test]
    fn test_emit_envelope_shape() {
        let message = SocketMessage::emit("u1", &status_event()).unwrap();
        let json: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(message.channel(), channels::SOCKET_EMIT);
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["event"], "reportStatusChanged");
        assert_eq!(json["payload"]["status"], "DISMISSED");
    }

    #[test]
    fn test_decode_by_channel() {
        let raw = r#"{"userId":"u1"}"#;
        assert_eq!(
            SocketMessage::decode(channels::SOCKET_DISCONNECT, raw).unwrap(),
            SocketMessage::disconnect("u1")
        );
        assert!(SocketMessage::decode(channels::SOCKET_EMIT, raw).is_err());
    }

    #[tokio::test]
    async fn test_local_pubsub_forwards() {
        let bus = LocalPubSub::new();
        let mut rx = bus.subscribe_local();

        bus.publish_to_user("u1", &status_event()).await.unwrap();
        bus.disconnect_user("u1").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().channel(), channels::SOCKET_EMIT);
        assert_eq!(rx.recv().await.unwrap(), SocketMessage::disconnect("u1"));
    }
}
