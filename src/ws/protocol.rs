//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::CombatantState;

/// Marker sent to the survivor when the opponent's session ended first
pub const OPPONENT_DISCONNECTED: &str = "Opponent disconnected";
/// Marker sent to both participants when a match hits its time limit
pub const MATCH_TIMED_OUT: &str = "Match timed out";

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Fire one projectile
    Fire,

    /// Any other well-formed message; accepted and ignored
    #[serde(other)]
    Unknown,
}

impl ClientMsg {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Match has started
    Start,

    /// Match has ended
    Stop {
        /// Simulation steps the match ran for
        ticks: u64,
        #[serde(rename = "bulletsFired")]
        bullets_fired: u32,
        won: bool,
        #[serde(rename = "errorMsg", default, skip_serializing_if = "Option::is_none")]
        error_msg: Option<String>,
    },

    /// Nobody was paired with a waiting participant in time
    Timeout,
}

impl ServerMsg {
    /// Terminal message for one combatant
    pub fn stop(ticks: u64, combatant: &CombatantState, error_msg: Option<&str>) -> Self {
        ServerMsg::Stop {
            ticks,
            bullets_fired: combatant.fire_count,
            won: combatant.won,
            error_msg: error_msg.map(str::to_string),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain enums of strings, integers and bools always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}
