//! Pairs connections into matches and drives their lifecycle

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::game::{Disconnect, GameMatch, MatchEnd, MatchId, MatchSettings, Side, TickOutcome};
use crate::metrics::MetricsAggregator;
use crate::ws::protocol::ServerMsg;
use crate::ws::{ConnectionId, Transport};

/// A scheduled piece of coordinator work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wake {
    /// Run one tick of a match
    Tick(MatchId),
    /// Give up on a lone waiting participant
    WaitingExpiry(ConnectionId),
}

/// Ask the scheduler to run `wake` at `at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeRequest {
    pub wake: Wake,
    pub at: u64,
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub match_settings: MatchSettings,
    /// Lone participants waiting longer than this are sent away
    pub waiting_timeout_ms: Option<u64>,
    /// Log a milestone every this many completed matches
    pub milestone_every: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            match_settings: MatchSettings::default(),
            waiting_timeout_ms: None,
            milestone_every: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Waiting {
    conn: ConnectionId,
    since: u64,
}

/// Lifecycle owner for every match in the process.
///
/// Holds at most one waiting participant. The second arrival starts a match
/// with the waiting one; the match then lives in `matches` until finished.
pub struct MatchCoordinator {
    settings: CoordinatorSettings,
    waiting: Option<Waiting>,
    matches: HashMap<MatchId, GameMatch>,
    routes: HashMap<ConnectionId, (MatchId, Side)>,
    next_match_id: u64,
    matches_completed: u64,
}

impl MatchCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            waiting: None,
            matches: HashMap::new(),
            routes: HashMap::new(),
            next_match_id: 0,
            matches_completed: 0,
        }
    }

    pub fn waiting(&self) -> Option<ConnectionId> {
        self.waiting.map(|w| w.conn)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn matches_completed(&self) -> u64 {
        self.matches_completed
    }

    /// Match and seat a connection is playing in
    pub fn route(&self, conn: ConnectionId) -> Option<(MatchId, Side)> {
        self.routes.get(&conn).copied()
    }

    /// A new connection arrived
    pub fn connect(
        &mut self,
        conn: ConnectionId,
        now: u64,
        transport: &mut dyn Transport,
        metrics: &mut MetricsAggregator,
    ) -> Option<WakeRequest> {
        let Some(first) = self.waiting.take() else {
            info!(conn = %conn, "Player 1 connected, waiting for opponent");
            self.waiting = Some(Waiting { conn, since: now });
            return self.settings.waiting_timeout_ms.map(|timeout| WakeRequest {
                wake: Wake::WaitingExpiry(conn),
                at: now + timeout,
            });
        };

        info!(conn = %conn, opponent = %first.conn, "Player 2 connected");

        self.next_match_id += 1;
        let id = MatchId(self.next_match_id);
        let mut game = GameMatch::new(id, first.conn, conn, &self.settings.match_settings, now);
        let first_wake = game.start(transport, metrics);

        self.routes.insert(first.conn, (id, Side::Near));
        self.routes.insert(conn, (id, Side::Far));
        self.matches.insert(id, game);
        metrics.count("gamesStarted");

        Some(WakeRequest {
            wake: Wake::Tick(id),
            at: first_wake,
        })
    }

    /// Raw inbound text from a connection
    pub fn on_message(&mut self, conn: ConnectionId, raw: &str) {
        match self.route(conn) {
            Some((id, side)) => {
                if let Some(game) = self.matches.get_mut(&id) {
                    game.session_mut(side).receive(raw);
                }
            }
            None if self.waiting() == Some(conn) => {
                debug!(conn = %conn, "Ignoring message before match start");
            }
            None => debug!(conn = %conn, "Ignoring message from unknown connection"),
        }
    }

    /// A connection closed or errored. Only recorded; running matches notice
    /// on their next tick.
    pub fn on_close(&mut self, conn: ConnectionId, reason: Disconnect, transport: &mut dyn Transport) {
        if let Some((id, side)) = self.route(conn) {
            if let Some(game) = self.matches.get_mut(&id) {
                game.session_mut(side).disconnect(reason);
            }
            return;
        }

        if self.waiting() == Some(conn) {
            info!(conn = %conn, ?reason, "Waiting player left before pairing");
            self.waiting = None;
            transport.release(conn);
        }
    }

    /// Run scheduled work. Returns the next wake time for the same task.
    pub fn run(
        &mut self,
        wake: Wake,
        now: u64,
        transport: &mut dyn Transport,
        metrics: &mut MetricsAggregator,
    ) -> Option<u64> {
        match wake {
            Wake::Tick(id) => {
                let game = self.matches.get_mut(&id)?;
                match game.tick(now, metrics) {
                    TickOutcome::Continue(next) => Some(next),
                    TickOutcome::Finished => {
                        self.finish(id, transport, metrics);
                        None
                    }
                }
            }
            Wake::WaitingExpiry(conn) => {
                self.expire_waiting(conn, now, transport, metrics);
                None
            }
        }
    }

    /// Finish a match: terminal messages, session release, counters.
    /// Returns false if there was no such running match.
    pub fn finish(
        &mut self,
        id: MatchId,
        transport: &mut dyn Transport,
        metrics: &mut MetricsAggregator,
    ) -> bool {
        let Some(mut game) = self.matches.remove(&id) else {
            return false;
        };
        let Some(end) = game.finish(transport) else {
            return false;
        };

        for side in [Side::Near, Side::Far] {
            self.routes.remove(&game.session(side).conn());
        }

        self.matches_completed += 1;
        if self.settings.milestone_every > 0
            && self.matches_completed % self.settings.milestone_every == 0
        {
            warn!(matches_completed = self.matches_completed, "Played {} games", self.matches_completed);
        }

        metrics.count("gamesPlayed");
        metrics.count(match end {
            MatchEnd::Decided(_) => "gamesDecided",
            MatchEnd::Abandoned { .. } => "gamesAbandoned",
            MatchEnd::Deserted => "gamesDeserted",
            MatchEnd::TimedOut => "gamesTimedOut",
            MatchEnd::Interrupted => "gamesInterrupted",
        });
        true
    }

    fn expire_waiting(
        &mut self,
        conn: ConnectionId,
        now: u64,
        transport: &mut dyn Transport,
        metrics: &mut MetricsAggregator,
    ) {
        let Some(waiting) = self.waiting else {
            return;
        };
        if waiting.conn != conn {
            return;
        }

        info!(
            conn = %conn,
            waited_ms = now.saturating_sub(waiting.since),
            "No opponent found, releasing waiting player"
        );
        self.waiting = None;
        transport.send(conn, ServerMsg::Timeout.to_json());
        transport.release(conn);
        metrics.count("waitingTimedOut");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySink;
    use crate::util::time::ManualClock;
    use crate::ws::MemoryTransport;
    use std::sync::Arc;

    struct Harness {
        coordinator: MatchCoordinator,
        transport: MemoryTransport,
        metrics: MetricsAggregator,
    }

    impl Harness {
        fn new(settings: CoordinatorSettings) -> Self {
            Self {
                coordinator: MatchCoordinator::new(settings),
                transport: MemoryTransport::new(),
                metrics: MetricsAggregator::new(
                    1000,
                    Arc::new(ManualClock::new(0)),
                    Box::new(MemorySink::new()),
                ),
            }
        }

        fn connect(&mut self, conn: u64, now: u64) -> Option<WakeRequest> {
            self.coordinator
                .connect(ConnectionId(conn), now, &mut self.transport, &mut self.metrics)
        }

        fn run(&mut self, wake: Wake, now: u64) -> Option<u64> {
            self.coordinator
                .run(wake, now, &mut self.transport, &mut self.metrics)
        }
    }

    #[test]
    fn test_first_connection_waits() {
        let mut h = Harness::new(CoordinatorSettings::default());
        assert_eq!(h.connect(1, 0), None);
        assert_eq!(h.coordinator.waiting(), Some(ConnectionId(1)));
        assert_eq!(h.coordinator.active_matches(), 0);
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[test]
    fn test_second_connection_starts_match() {
        let mut h = Harness::new(CoordinatorSettings::default());
        h.connect(1, 0);
        let request = h.connect(2, 100).unwrap();

        assert_eq!(request.wake, Wake::Tick(MatchId(1)));
        assert_eq!(request.at, 116);
        assert_eq!(h.coordinator.waiting(), None);
        assert_eq!(h.coordinator.route(ConnectionId(1)), Some((MatchId(1), Side::Near)));
        assert_eq!(h.coordinator.route(ConnectionId(2)), Some((MatchId(1), Side::Far)));
        assert_eq!(h.transport.messages_for(ConnectionId(1)), vec![ServerMsg::Start]);
        assert_eq!(h.transport.messages_for(ConnectionId(2)), vec![ServerMsg::Start]);

        // A third connection waits for a fourth.
        assert_eq!(h.connect(3, 120), None);
        assert_eq!(h.coordinator.waiting(), Some(ConnectionId(3)));
    }

    #[test]
    fn test_waiting_disconnect_clears_slot() {
        let mut h = Harness::new(CoordinatorSettings::default());
        h.connect(1, 0);
        h.coordinator
            .on_close(ConnectionId(1), Disconnect::Closed, &mut h.transport);

        assert_eq!(h.coordinator.waiting(), None);
        assert!(h.transport.is_released(ConnectionId(1)));

        assert_eq!(h.connect(2, 10), None);
        assert_eq!(h.coordinator.active_matches(), 0);
    }

    #[test]
    fn test_disconnect_observed_on_next_tick() {
        let mut h = Harness::new(CoordinatorSettings::default());
        h.connect(1, 0);
        let request = h.connect(2, 0).unwrap();

        h.coordinator.on_message(ConnectionId(2), r#"{"type":"fire"}"#);
        h.coordinator
            .on_close(ConnectionId(1), Disconnect::Closed, &mut h.transport);
        assert_eq!(h.coordinator.active_matches(), 1);

        assert_eq!(h.run(request.wake, 17), None);
        assert_eq!(h.coordinator.active_matches(), 0);
        assert_eq!(h.coordinator.matches_completed(), 1);
        assert_eq!(h.coordinator.route(ConnectionId(2)), None);

        let last = h.transport.messages_for(ConnectionId(2)).pop().unwrap();
        assert!(matches!(
            last,
            ServerMsg::Stop { bullets_fired: 1, won: false, error_msg: Some(_), .. }
        ));
    }

    #[test]
    fn test_finish_twice_counts_once() {
        let mut h = Harness::new(CoordinatorSettings::default());
        h.connect(1, 0);
        h.connect(2, 0);

        assert!(h
            .coordinator
            .finish(MatchId(1), &mut h.transport, &mut h.metrics));
        assert!(!h
            .coordinator
            .finish(MatchId(1), &mut h.transport, &mut h.metrics));

        assert_eq!(h.coordinator.matches_completed(), 1);
        assert_eq!(h.metrics.pending_counter("gamesPlayed"), Some(1));
        // Two starts and two stops.
        assert_eq!(h.transport.sent_count(), 4);
    }

    #[test]
    fn test_tick_of_finished_match_is_dropped() {
        let mut h = Harness::new(CoordinatorSettings::default());
        h.connect(1, 0);
        h.connect(2, 0);
        h.coordinator
            .finish(MatchId(1), &mut h.transport, &mut h.metrics);

        assert_eq!(h.run(Wake::Tick(MatchId(1)), 50), None);
        assert_eq!(h.coordinator.matches_completed(), 1);
    }

    #[test]
    fn test_waiting_timeout() {
        let settings = CoordinatorSettings {
            waiting_timeout_ms: Some(5_000),
            ..CoordinatorSettings::default()
        };
        let mut h = Harness::new(settings);

        let request = h.connect(1, 1_000).unwrap();
        assert_eq!(request.wake, Wake::WaitingExpiry(ConnectionId(1)));
        assert_eq!(request.at, 6_000);

        assert_eq!(h.run(request.wake, 6_001), None);
        assert_eq!(h.coordinator.waiting(), None);
        assert_eq!(h.transport.messages_for(ConnectionId(1)), vec![ServerMsg::Timeout]);
        assert!(h.transport.is_released(ConnectionId(1)));
    }

    #[test]
    fn test_stale_waiting_expiry_is_ignored() {
        let settings = CoordinatorSettings {
            waiting_timeout_ms: Some(5_000),
            ..CoordinatorSettings::default()
        };
        let mut h = Harness::new(settings);

        let expiry = h.connect(1, 0).unwrap();
        h.connect(2, 10);
        h.connect(3, 20);

        assert_eq!(h.run(expiry.wake, 5_001), None);
        assert_eq!(h.coordinator.waiting(), Some(ConnectionId(3)));
        assert_eq!(h.coordinator.active_matches(), 1);
    }

    #[test]
    fn test_milestone_counter() {
        let settings = CoordinatorSettings {
            milestone_every: 2,
            ..CoordinatorSettings::default()
        };
        let mut h = Harness::new(settings);
        for pair in 0..3u64 {
            h.connect(pair * 2 + 1, 0);
            h.connect(pair * 2 + 2, 0);
            h.coordinator
                .finish(MatchId(pair + 1), &mut h.transport, &mut h.metrics);
        }
        assert_eq!(h.coordinator.matches_completed(), 3);
    }
}
