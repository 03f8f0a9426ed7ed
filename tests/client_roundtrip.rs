//! Real sockets: axum server, game loop and the load-test client

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use duel_server::app::AppState;
use duel_server::client::{play, Outcome};
use duel_server::config::Config;
use duel_server::game::{Ballistics, MatchSettings};
use duel_server::http::build_router;
use duel_server::lobby::{GameLoop, LoopSettings};
use duel_server::matchmaking::CoordinatorSettings;
use duel_server::metrics::MemorySink;
use duel_server::util::time::SystemClock;
use duel_server::ws::protocol::OPPONENT_DISCONNECTED;
use duel_server::ws::ChannelTransport;

/// Start a server on an ephemeral port. Projectiles are fast so a decided
/// game takes well under a second.
async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let settings = CoordinatorSettings {
        match_settings: MatchSettings {
            ballistics: Ballistics::with_speed(5_000.0),
            ..MatchSettings::default()
        },
        ..CoordinatorSettings::default()
    };
    let game_loop = GameLoop::new(
        settings,
        &LoopSettings {
            report_interval_ms: 1000,
            poll_budget_ms: 2,
        },
        Arc::new(SystemClock::new()),
        Box::new(MemorySink::new()),
        ChannelTransport::new(),
    );
    let status = game_loop.status();
    let (lobby_tx, lobby_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(game_loop.run(lobby_rx, shutdown_rx));

    let router = build_router(AppState::new(Config::default(), lobby_tx, status));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, shutdown_tx)
}

#[tokio::test]
async fn firing_client_beats_idle_client() {
    let (addr, _shutdown) = spawn_server().await;
    let url = format!("ws://{}/", addr);

    let (shooter, _) = connect_async(url.as_str()).await.unwrap();
    let (idle, _) = connect_async(url.as_str()).await.unwrap();

    let (shooter, idle) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(play(shooter, Some(Duration::from_millis(50))), play(idle, None)) },
    )
    .await
    .unwrap();

    match (shooter.unwrap(), idle.unwrap()) {
        (
            Outcome::Stopped { won: true, bullets_fired, ticks, error_msg: None },
            Outcome::Stopped { won: false, bullets_fired: 0, ticks: idle_ticks, error_msg: None },
        ) => {
            assert!(bullets_fired >= 1);
            assert_eq!(ticks, idle_ticks);
        }
        other => panic!("unexpected outcomes: {:?}", other),
    }
}

#[tokio::test]
async fn invalid_utf8_frame_ends_the_match_for_the_opponent() {
    let (addr, _shutdown) = spawn_server().await;
    let url = format!("ws://{}/", addr);

    let (mut broken, _) = connect_async(url.as_str()).await.unwrap();
    let (survivor, _) = connect_async(url.as_str()).await.unwrap();

    let survivor = tokio::spawn(play(survivor, None));

    // Give the server time to pair both sockets before the bad frame lands.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut frame = br#"{"type":"fire","pad":""#.to_vec();
    frame.extend_from_slice(&[0xff, 0xfe]);
    frame.extend_from_slice(br#""}"#);
    broken.send(Message::Binary(frame)).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), survivor)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match outcome {
        Outcome::Stopped { won, error_msg, .. } => {
            assert!(!won);
            assert_eq!(error_msg.as_deref(), Some(OPPONENT_DISCONNECTED));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
