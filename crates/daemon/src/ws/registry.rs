use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use gridexec_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing frames to one connection.
pub type PeerSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single control connection (client or wrapper).
struct Peer {
    sender: PeerSender,
    connected_at: Timestamp,
}

/// Tracks all live control-protocol connections.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared
/// across the application.
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<String, Peer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection's outbound sender.
    pub async fn add(&self, conn_id: String, sender: PeerSender) {
        let peer = Peer {
            sender,
            connected_at: chrono::Utc::now(),
        };
        self.peers.write().await.insert(conn_id, peer);
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(peer) = self.peers.write().await.remove(conn_id) {
            let session_secs = (chrono::Utc::now() - peer.connected_at).num_seconds();
            tracing::debug!(conn_id, session_secs, "Connection deregistered");
        }
    }

    /// Current number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Send a Ping frame to every connection.
    ///
    /// Used by the keepalive task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let peers = self.peers.read().await;
        for peer in peers.values() {
            let _ = peer.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify peers before the server
    /// stops.
    pub async fn shutdown_all(&self) {
        let mut peers = self.peers.write().await;
        let count = peers.len();
        for peer in peers.values() {
            let _ = peer.sender.send(Message::Close(None));
        }
        peers.clear();
        tracing::info!(count, "Closed all control connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
