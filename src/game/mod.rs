//! Game simulation modules

pub mod combat;
pub mod r#match;
pub mod session;
pub mod simulation;

pub use combat::{Ballistics, Facing, Projectile, ProjectileId};
pub use r#match::{GameMatch, MatchEnd, MatchId, MatchPhase, MatchSettings, TickOutcome};
pub use session::{Disconnect, ParticipantSession};
pub use simulation::{CombatantState, SimEvent, Side, Simulation};
