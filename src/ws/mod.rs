//! WebSocket transport and wire protocol

pub mod handler;
pub mod outbound;
pub mod protocol;

use std::fmt;

pub use outbound::{ChannelTransport, MemoryTransport};

/// Identifies one socket for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of the transport as seen by the game core
pub trait Transport {
    /// Queue a text frame for `conn`. Sending to a released or dead
    /// connection is silently dropped.
    fn send(&mut self, conn: ConnectionId, text: String);

    /// The core holds no more state for `conn`
    fn release(&mut self, conn: ConnectionId);
}
