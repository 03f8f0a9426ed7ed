//! Matchmaking: pairing and match lifecycle

pub mod coordinator;

pub use coordinator::{CoordinatorSettings, MatchCoordinator, Wake, WakeRequest};
