//! End-to-end flows through the game loop with a manual clock

use std::sync::Arc;

use duel_server::game::Disconnect;
use duel_server::lobby::{GameLoop, LoopSettings};
use duel_server::matchmaking::CoordinatorSettings;
use duel_server::metrics::MemorySink;
use duel_server::util::time::ManualClock;
use duel_server::ws::protocol::{ServerMsg, OPPONENT_DISCONNECTED};
use duel_server::ws::{ConnectionId, MemoryTransport};

const NEAR: ConnectionId = ConnectionId(1);
const FAR: ConnectionId = ConnectionId(2);

struct Lobby {
    clock: Arc<ManualClock>,
    sink: MemorySink,
    game_loop: GameLoop<MemoryTransport>,
}

impl Lobby {
    fn new(settings: CoordinatorSettings) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let sink = MemorySink::new();
        let game_loop = GameLoop::new(
            settings,
            &LoopSettings {
                report_interval_ms: 1000,
                poll_budget_ms: 2,
            },
            clock.clone(),
            Box::new(sink.clone()),
            MemoryTransport::new(),
        );
        Self {
            clock,
            sink,
            game_loop,
        }
    }

    fn paired() -> Self {
        let mut lobby = Self::new(CoordinatorSettings::default());
        lobby.game_loop.connect(NEAR);
        lobby.game_loop.connect(FAR);
        lobby
    }

    /// Advance in frame-sized steps until no match is running
    fn run_until_idle(&mut self, max_ms: u64) {
        let mut elapsed = 0;
        while self.game_loop.coordinator().active_matches() > 0 && elapsed < max_ms {
            self.clock.advance(16);
            elapsed += 16;
            self.game_loop.poll();
        }
    }

    fn messages(&self, conn: ConnectionId) -> Vec<ServerMsg> {
        self.game_loop.transport().messages_for(conn)
    }
}

fn stop_of(messages: &[ServerMsg]) -> (u64, u32, bool, Option<String>) {
    match messages.last() {
        Some(ServerMsg::Stop {
            ticks,
            bullets_fired,
            won,
            error_msg,
        }) => (*ticks, *bullets_fired, *won, error_msg.clone()),
        other => panic!("expected stop, got {:?}", other),
    }
}

#[test]
fn single_shot_decides_the_match() {
    let mut lobby = Lobby::paired();
    lobby.game_loop.message(NEAR, r#"{"type":"fire"}"#);

    lobby.run_until_idle(10_000);

    assert_eq!(lobby.game_loop.coordinator().active_matches(), 0);
    assert_eq!(lobby.game_loop.coordinator().matches_completed(), 1);

    let near = lobby.messages(NEAR);
    let far = lobby.messages(FAR);
    assert_eq!(near.first(), Some(&ServerMsg::Start));
    assert_eq!(far.first(), Some(&ServerMsg::Start));

    let (near_ticks, near_fired, near_won, near_error) = stop_of(&near);
    let (far_ticks, far_fired, far_won, far_error) = stop_of(&far);
    assert!(near_won);
    assert!(!far_won);
    assert_eq!(near_fired, 1);
    assert_eq!(far_fired, 0);
    assert_eq!(near_ticks, far_ticks);
    assert!(near_ticks > 0);
    assert_eq!(near_error, None);
    assert_eq!(far_error, None);

    assert!(lobby.game_loop.transport().is_released(NEAR));
    assert!(lobby.game_loop.transport().is_released(FAR));

    lobby.game_loop.shutdown();
    assert_eq!(lobby.sink.counter_total("gamesPlayed"), 1);
    assert_eq!(lobby.sink.counter_total("gamesDecided"), 1);
}

#[test]
fn opponent_disconnect_notifies_survivor() {
    let mut lobby = Lobby::paired();
    lobby.run_until_idle(100);

    lobby.game_loop.disconnect(FAR, Disconnect::Closed);
    lobby.run_until_idle(100);

    let (_, _, won, error) = stop_of(&lobby.messages(NEAR));
    assert!(!won);
    assert_eq!(error.as_deref(), Some(OPPONENT_DISCONNECTED));

    // The departed side gets nothing beyond its start message.
    assert_eq!(lobby.messages(FAR), vec![ServerMsg::Start]);
    assert!(lobby.game_loop.transport().is_released(FAR));
}

#[test]
fn malformed_message_counts_as_error_disconnect() {
    let mut lobby = Lobby::paired();
    lobby.game_loop.message(NEAR, "{not json");
    lobby.run_until_idle(100);

    let (_, _, _, error) = stop_of(&lobby.messages(FAR));
    assert_eq!(error.as_deref(), Some(OPPONENT_DISCONNECTED));
    assert_eq!(lobby.messages(NEAR), vec![ServerMsg::Start]);
}

#[test]
fn both_leaving_ends_silently() {
    let mut lobby = Lobby::paired();
    lobby.game_loop.disconnect(NEAR, Disconnect::Closed);
    lobby.game_loop.disconnect(FAR, Disconnect::Errored);
    lobby.run_until_idle(100);

    assert_eq!(lobby.messages(NEAR), vec![ServerMsg::Start]);
    assert_eq!(lobby.messages(FAR), vec![ServerMsg::Start]);
    assert_eq!(lobby.game_loop.coordinator().matches_completed(), 1);

    lobby.game_loop.shutdown();
    assert_eq!(lobby.sink.counter_total("gamesDeserted"), 1);
}

#[test]
fn lone_player_times_out_when_configured() {
    let mut lobby = Lobby::new(CoordinatorSettings {
        waiting_timeout_ms: Some(500),
        ..CoordinatorSettings::default()
    });
    lobby.game_loop.connect(NEAR);

    // Entries run only once the poll starts strictly after their time.
    lobby.clock.advance(500);
    lobby.game_loop.poll();
    assert_eq!(lobby.game_loop.coordinator().waiting(), Some(NEAR));

    lobby.clock.advance(1);
    lobby.game_loop.poll();
    assert_eq!(lobby.game_loop.coordinator().waiting(), None);
    assert_eq!(lobby.messages(NEAR), vec![ServerMsg::Timeout]);
    assert!(lobby.game_loop.transport().is_released(NEAR));

    // The next arrival waits rather than pairing with the expired player.
    lobby.game_loop.connect(FAR);
    assert_eq!(lobby.game_loop.coordinator().waiting(), Some(FAR));
}

#[test]
fn consecutive_pairs_get_separate_matches() {
    let mut lobby = Lobby::new(CoordinatorSettings::default());
    for conn in 1..=4 {
        lobby.game_loop.connect(ConnectionId(conn));
    }
    assert_eq!(lobby.game_loop.coordinator().active_matches(), 2);
    assert_eq!(lobby.game_loop.scheduler().len(), 2);
    assert_eq!(lobby.game_loop.coordinator().waiting(), None);
}
