//! Duel Server - authoritative two-player projectile duel over WebSockets
//!
//! Connections are paired first come, first served. Each pair plays one
//! match on a fixed 60 Hz cadence driven by a single cooperative scheduler.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod matchmaking;
pub mod metrics;
pub mod timing;
pub mod util;
pub mod ws;
