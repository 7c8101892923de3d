//! Delivery of socket messages to the connections this process owns.
//!
//! Every process receives every message. For each one it asks the shared
//! presence directory for the target user's connections and acts only on
//! those attached to its own [`ConnectionHub`].

use std::sync::Arc;

use agora_common::{AppResult, IdGenerator};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::{ConnectionHub, OutboundMessage};
use crate::presence::PresenceDirectory;
use crate::pubsub::{SocketDisconnect, SocketEmit, SocketMessage};

/// Presence-aware fan-out for one process.
#[derive(Clone)]
pub struct PresenceFanout {
    presence: Arc<dyn PresenceDirectory>,
    hub: ConnectionHub,
    id_gen: IdGenerator,
}

impl PresenceFanout {
    /// Create a fan-out over a presence directory and a local hub.
    #[must_use]
    pub const fn new(presence: Arc<dyn PresenceDirectory>, hub: ConnectionHub) -> Self {
        Self {
            presence,
            hub,
            id_gen: IdGenerator::new(),
        }
    }

    /// The local hub.
    #[must_use]
    pub const fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Open a connection for a user: attach locally and register in the directory.
    pub async fn open_connection(
        &self,
        user_id: &str,
    ) -> AppResult<(String, mpsc::UnboundedReceiver<OutboundMessage>)> {
        let connection_id = self.id_gen.connection_handle();
        let rx = self.hub.attach(&connection_id, user_id).await;

        if let Err(e) = self.presence.register_connection(user_id, &connection_id).await {
            self.hub.detach(&connection_id).await;
            return Err(e);
        }

        info!(user_id = %user_id, connection_id = %connection_id, "Connection opened");
        Ok((connection_id, rx))
    }

    /// Close a connection that ended on the client side.
    pub async fn close_connection(&self, connection_id: &str) -> AppResult<()> {
        self.hub.detach(connection_id).await;
        self.presence.unregister_connection(connection_id).await?;
        debug!(connection_id = %connection_id, "Connection closed");
        Ok(())
    }

    /// Push an event to the target user's local connections. Returns how many received it.
    pub async fn deliver(&self, emit: &SocketEmit) -> AppResult<usize> {
        let connections = self.presence.list_connections(&emit.user_id).await?;
        let mut delivered = 0;

        for connection_id in connections {
            let message = OutboundMessage::Event {
                event: emit.event.clone(),
                payload: emit.payload.clone(),
            };
            if self.hub.send(&connection_id, message).await {
                delivered += 1;
            }
        }

        debug!(
            user_id = %emit.user_id,
            event = %emit.event,
            delivered,
            "Delivered socket event"
        );
        Ok(delivered)
    }

    /// Close the target user's local connections and unregister them. Returns how many closed.
    pub async fn disconnect(&self, request: &SocketDisconnect) -> AppResult<usize> {
        let connections = self.presence.list_connections(&request.user_id).await?;
        let mut closed = 0;

        for connection_id in connections {
            if !self.hub.close(&connection_id).await {
                continue;
            }
            closed += 1;
            if let Err(e) = self.presence.unregister_connection(&connection_id).await {
                warn!(
                    error = %e,
                    connection_id = %connection_id,
                    "Failed to unregister closed connection"
                );
            }
        }

        if closed > 0 {
            info!(user_id = %request.user_id, closed, "Disconnected user");
        }
        Ok(closed)
    }

    /// Handle one message from the bus.
    pub async fn handle(&self, message: &SocketMessage) -> AppResult<usize> {
        match message {
            SocketMessage::Emit(emit) => self.deliver(emit).await,
            SocketMessage::Disconnect(request) => self.disconnect(request).await,
        }
    }

    /// Consume messages from a bus receiver until it closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<SocketMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if let Err(e) = self.handle(&message).await {
                            warn!(
                                error = %e,
                                user_id = %message.user_id(),
                                "Failed to fan out socket message"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Fan-out lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Fan-out channel closed");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::presence::MemoryPresence;
    use serde_json::json;

    fn emit(user_id: &str) -> SocketEmit {
        SocketEmit {
            user_id: user_id.to_string(),
            event: "warnUser".to_string(),
            payload: json!({"userId": user_id}),
        }
    }

    #[tokio::test]
    async fn test_only_local_connections_receive() {
        let presence: Arc<dyn PresenceDirectory> = Arc::new(MemoryPresence::new());
        let here = PresenceFanout::new(presence.clone(), ConnectionHub::new());
        let there = PresenceFanout::new(presence.clone(), ConnectionHub::new());

        let (_, mut local_rx) = here.open_connection("u1").await.unwrap();
        let (_, mut remote_rx) = there.open_connection("u1").await.unwrap();

        assert_eq!(here.deliver(&emit("u1")).await.unwrap(), 1);

        assert!(matches!(
            local_rx.try_recv(),
            Ok(OutboundMessage::Event { ref event, .. }) if event == "warnUser"
        ));
        assert!(remote_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_unregisters() {
        let presence: Arc<dyn PresenceDirectory> = Arc::new(MemoryPresence::new());
        let here = PresenceFanout::new(presence.clone(), ConnectionHub::new());
        let there = PresenceFanout::new(presence.clone(), ConnectionHub::new());

        let (_, mut rx1) = here.open_connection("u1").await.unwrap();
        let (_, _rx2) = here.open_connection("u1").await.unwrap();
        let (remote_id, _rx3) = there.open_connection("u1").await.unwrap();
        here.open_connection("u2").await.unwrap();

        let request = SocketDisconnect {
            user_id: "u1".to_string(),
        };
        assert_eq!(here.disconnect(&request).await.unwrap(), 2);

        assert_eq!(rx1.recv().await, Some(OutboundMessage::Close));
        assert_eq!(presence.list_connections("u1").await.unwrap(), vec![remote_id]);
        assert_eq!(here.hub().len().await, 1);

        assert_eq!(there.disconnect(&request).await.unwrap(), 1);
        assert_eq!(presence.online_users().await.unwrap(), vec!["u2"]);
    }

    #[tokio::test]
    async fn test_close_connection_leaves_directory() {
        let presence: Arc<dyn PresenceDirectory> = Arc::new(MemoryPresence::new());
        let fanout = PresenceFanout::new(presence.clone(), ConnectionHub::new());

        let (connection_id, _rx) = fanout.open_connection("u1").await.unwrap();
        fanout.close_connection(&connection_id).await.unwrap();

        assert!(presence.online_users().await.unwrap().is_empty());
        assert_eq!(fanout.deliver(&emit("u1")).await.unwrap(), 0);
    }
}
