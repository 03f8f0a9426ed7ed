//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::Disconnect;
use crate::lobby::LobbyEvent;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::ConnectionId;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = state.next_connection_id();
    debug!(conn = %conn, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    if state
        .lobby_tx
        .send(LobbyEvent::Connected {
            conn,
            outbound: outbound_tx,
        })
        .is_err()
    {
        warn!(conn = %conn, "Game loop is gone, refusing connection");
        let _ = ws_sink.close().await;
        return;
    }

    // Writer task: game loop -> WebSocket. Ends when the loop releases the
    // connection and drops its sender.
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(conn = %conn, error = %e, "WebSocket send failed");
                return;
            }
        }
        let _ = ws_sink.close().await;
    });

    let reason = run_reader(conn, ws_stream, &state).await;

    let _ = state.lobby_tx.send(LobbyEvent::Disconnected { conn, reason });

    // The peer stopped reading; nothing left to deliver.
    writer_handle.abort();

    debug!(conn = %conn, ?reason, "WebSocket connection closed");
}

/// What one inbound frame means to the game loop
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Text(String),
    Control,
    Closed,
    /// Binary frame that is not UTF-8; treated like unparseable input
    Malformed,
}

fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text),
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Inbound::Text(text),
            Err(_) => Inbound::Malformed,
        },
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(_) => Inbound::Closed,
    }
}

/// Reader loop: WebSocket -> game loop
async fn run_reader(
    conn: ConnectionId,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    state: &AppState,
) -> Disconnect {
    let rate_limiter = ConnectionRateLimiter::with_limit(state.config.inbound_rate_limit);

    while let Some(result) = ws_stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                info!(conn = %conn, error = %e, "WebSocket error");
                return Disconnect::Errored;
            }
        };

        let text = match classify(message) {
            Inbound::Text(text) => text,
            Inbound::Control => continue,
            Inbound::Closed => {
                debug!(conn = %conn, "Client initiated close");
                return Disconnect::Closed;
            }
            Inbound::Malformed => {
                warn!(conn = %conn, "Binary frame is not valid UTF-8");
                return Disconnect::Errored;
            }
        };

        if !rate_limiter.check_inbound() {
            warn!(conn = %conn, "Rate limited inbound message");
            continue;
        }

        if state
            .lobby_tx
            .send(LobbyEvent::Message { conn, text })
            .is_err()
        {
            debug!(conn = %conn, "Game loop channel closed");
            return Disconnect::Closed;
        }
    }

    Disconnect::Closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_binary_is_text() {
        let frame = Message::Binary(br#"{"type":"fire"}"#.to_vec());
        assert_eq!(classify(frame), Inbound::Text(r#"{"type":"fire"}"#.to_string()));
    }

    #[test]
    fn test_invalid_utf8_binary_is_malformed() {
        let mut bytes = br#"{"type":"fire","pad":""#.to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(br#""}"#);
        assert_eq!(classify(Message::Binary(bytes)), Inbound::Malformed);
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(classify(Message::Ping(vec![1])), Inbound::Control);
        assert_eq!(classify(Message::Pong(Vec::new())), Inbound::Control);
        assert_eq!(classify(Message::Close(None)), Inbound::Closed);
    }
}
