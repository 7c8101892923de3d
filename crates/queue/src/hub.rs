//! Live connections held by this process.

#![allow(missing_docs)]

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// Message delivered to a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A named event with its JSON body.
    Event { event: String, payload: Value },
    /// The server is closing the connection.
    Close,
}

struct LocalConnection {
    user_id: String,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// Registry of connections whose sockets live in this process.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    connections: Arc<RwLock<HashMap<String, LocalConnection>>>,
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection and return the receiving end of its outbound channel.
    pub async fn attach(
        &self,
        connection_id: &str,
        user_id: &str,
    ) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(
            connection_id.to_string(),
            LocalConnection {
                user_id: user_id.to_string(),
                tx,
            },
        );
        rx
    }

    /// Forget a connection. Returns its user id if it was attached.
    pub async fn detach(&self, connection_id: &str) -> Option<String> {
        self.connections
            .write()
            .await
            .remove(connection_id)
            .map(|c| c.user_id)
    }

    /// Whether the connection lives in this process.
    pub async fn owns(&self, connection_id: &str) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    /// Send to a local connection. Returns false when it is not attached or its receiver is gone.
    pub async fn send(&self, connection_id: &str, message: OutboundMessage) -> bool {
        self.connections
            .read()
            .await
            .get(connection_id)
            .is_some_and(|c| c.tx.send(message).is_ok())
    }

    /// Send [`OutboundMessage::Close`] and detach.
    pub async fn close(&self, connection_id: &str) -> bool {
        match self.connections.write().await.remove(connection_id) {
            Some(connection) => {
                let _ = connection.tx.send(OutboundMessage::Close);
                true
            }
            None => false,
        }
    }

    /// Number of attached connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connections are attached.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
