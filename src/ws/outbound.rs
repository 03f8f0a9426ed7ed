//! Transport implementations: socket channels and an in-memory recorder

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::ServerMsg;
use super::{ConnectionId, Transport};

/// Routes outbound frames to each socket's writer task
#[derive(Debug, Default)]
pub struct ChannelTransport {
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<String>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnectionId, tx: mpsc::UnboundedSender<String>) {
        self.outbound.insert(conn, tx);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, conn: ConnectionId, text: String) {
        match self.outbound.get(&conn) {
            Some(tx) => {
                if tx.send(text).is_err() {
                    debug!(conn = %conn, "Writer gone, dropping frame");
                }
            }
            None => debug!(conn = %conn, "No outbound channel for connection"),
        }
    }

    fn release(&mut self, conn: ConnectionId) {
        // Dropping the sender lets the writer drain what is queued and exit.
        self.outbound.remove(&conn);
    }
}

/// Records every frame instead of sending it
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<(ConnectionId, String)>,
    released: HashSet<ConnectionId>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Decoded frames sent to `conn`, in order
    pub fn messages_for(&self, conn: ConnectionId) -> Vec<ServerMsg> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == conn)
            .filter_map(|(_, text)| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn is_released(&self, conn: ConnectionId) -> bool {
        self.released.contains(&conn)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, conn: ConnectionId, text: String) {
        self.sent.push((conn, text));
    }

    fn release(&mut self, conn: ConnectionId) {
        self.released.insert(conn);
    }
}
