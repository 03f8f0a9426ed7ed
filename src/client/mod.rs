//! Load-test client: plays one side of a duel over a WebSocket and tallies
//! results across many games

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::ws::protocol::{ClientMsg, ServerMsg};

/// How one participant's game ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server sent `stop`
    Stopped {
        ticks: u64,
        bullets_fired: u32,
        won: bool,
        error_msg: Option<String>,
    },
    /// Nobody was paired with us in time
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("Unparseable server message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected {0} message")]
    Unexpected(&'static str),

    #[error("Connection closed before the game ended")]
    Closed,
}

/// Wait for `start`, fire every `fire_every` (never when `None`) until the
/// server says `stop`.
pub async fn play<S>(mut stream: S, fire_every: Option<Duration>) -> Result<Outcome, ClientError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    match next_server_msg(&mut stream).await? {
        ServerMsg::Start => {}
        ServerMsg::Timeout => return Ok(Outcome::TimedOut),
        ServerMsg::Stop { .. } => return Err(ClientError::Unexpected("stop")),
    }

    let fire = serde_json::to_string(&ClientMsg::Fire)?;
    let mut fire_timer = fire_every.map(|every| {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            msg = next_server_msg(&mut stream) => match msg? {
                ServerMsg::Stop { ticks, bullets_fired, won, error_msg } => {
                    return Ok(Outcome::Stopped { ticks, bullets_fired, won, error_msg });
                }
                ServerMsg::Timeout => return Ok(Outcome::TimedOut),
                ServerMsg::Start => return Err(ClientError::Unexpected("start")),
            },
            _ = tick(&mut fire_timer) => {
                stream.send(Message::Text(fire.clone())).await?;
            }
        }
    }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn next_server_msg<S>(stream: &mut S) -> Result<ServerMsg, ClientError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                debug!(%text, "Server message");
                return Ok(serde_json::from_str(&text)?);
            }
            Message::Binary(bytes) => return Ok(serde_json::from_slice(&bytes)?),
            Message::Close(_) => return Err(ClientError::Closed),
            _ => {}
        }
    }
    Err(ClientError::Closed)
}

/// Totals over every game a load run played
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub games: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub ticks: u64,
    pub bullets_fired: u64,
    pub fast_won: u64,
    pub slow_won: u64,
}

impl Tally {
    /// Fold in both sides of one game. Stats are only counted when both
    /// participants saw a clean `stop`.
    pub fn record(
        &mut self,
        fast: &Result<Outcome, ClientError>,
        slow: &Result<Outcome, ClientError>,
    ) {
        self.games += 1;
        self.failures += [fast, slow].iter().filter(|r| r.is_err()).count() as u64;
        self.timeouts += [fast, slow]
            .iter()
            .filter(|r| matches!(r, Ok(Outcome::TimedOut)))
            .count() as u64;

        let (Ok(fast), Ok(slow)) = (fast, slow) else {
            return;
        };
        if let (
            Outcome::Stopped {
                ticks,
                bullets_fired: fast_fired,
                won: fast_won,
                ..
            },
            Outcome::Stopped {
                bullets_fired: slow_fired,
                won: slow_won,
                ..
            },
        ) = (fast, slow)
        {
            self.ticks += *ticks;
            self.bullets_fired += u64::from(*fast_fired) + u64::from(*slow_fired);
            self.fast_won += u64::from(*fast_won);
            self.slow_won += u64::from(*slow_won);
        }
    }
}
