//! Per-participant session state inside a match

use std::collections::VecDeque;

use tracing::warn;

use crate::ws::protocol::ClientMsg;
use crate::ws::ConnectionId;

/// Why a connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Orderly close from either end
    Closed,
    /// Transport reported an error
    Errored,
}

/// Inputs and liveness of one paired participant.
///
/// Close and error are only recorded here; the match notices them at its
/// next tick.
#[derive(Debug)]
pub struct ParticipantSession {
    conn: ConnectionId,
    pending: VecDeque<ClientMsg>,
    closed: bool,
    errored: bool,
}

impl ParticipantSession {
    pub fn new(conn: ConnectionId) -> Self {
        Self {
            conn,
            pending: VecDeque::new(),
            closed: false,
            errored: false,
        }
    }

    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Queue a raw inbound payload. Anything that does not parse marks the
    /// session errored.
    pub fn receive(&mut self, raw: &str) {
        match ClientMsg::parse(raw) {
            Ok(msg) => self.pending.push_back(msg),
            Err(e) => {
                warn!(conn = %self.conn, error = %e, "Malformed client message");
                self.errored = true;
            }
        }
    }

    pub fn disconnect(&mut self, reason: Disconnect) {
        match reason {
            Disconnect::Closed => self.closed = true,
            Disconnect::Errored => self.errored = true,
        }
    }

    /// Take every queued message, oldest first
    pub fn take_pending(&mut self) -> Vec<ClientMsg> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Closed or errored
    pub fn stopped(&self) -> bool {
        self.closed || self.errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keeps_arrival_order() {
        let mut session = ParticipantSession::new(ConnectionId(1));
        session.receive(r#"{"type":"fire"}"#);
        session.receive(r#"{"type":"ping"}"#);
        session.receive(r#"{"type":"fire"}"#);

        assert_eq!(
            session.take_pending(),
            vec![ClientMsg::Fire, ClientMsg::Unknown, ClientMsg::Fire]
        );
        assert_eq!(session.pending_len(), 0);
        assert!(!session.stopped());
    }

    #[test]
    fn test_malformed_payload_marks_errored() {
        let mut session = ParticipantSession::new(ConnectionId(1));
        session.receive("{not json");

        assert!(session.is_errored());
        assert!(!session.is_closed());
        assert!(session.stopped());
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_disconnect_reasons() {
        let mut closed = ParticipantSession::new(ConnectionId(1));
        closed.disconnect(Disconnect::Closed);
        assert!(closed.is_closed() && !closed.is_errored());

        let mut errored = ParticipantSession::new(ConnectionId(2));
        errored.disconnect(Disconnect::Errored);
        assert!(errored.is_errored() && errored.stopped());
    }
}
