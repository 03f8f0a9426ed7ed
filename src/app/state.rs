//! Application state shared across routes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::lobby::{LobbyEvent, SharedStatus};
use crate::ws::ConnectionId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Inbound half of the game loop
    pub lobby_tx: mpsc::UnboundedSender<LobbyEvent>,
    /// Snapshot of the loop for the health endpoint
    pub status: SharedStatus,
    next_connection: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        config: Config,
        lobby_tx: mpsc::UnboundedSender<LobbyEvent>,
        status: SharedStatus,
    ) -> Self {
        Self {
            config: Arc::new(config),
            lobby_tx,
            status,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate an identity for a freshly upgraded socket
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }
}
