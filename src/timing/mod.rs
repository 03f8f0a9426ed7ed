//! Frame cadence and the shared cooperative scheduler

pub mod cadence;
pub mod scheduler;

pub use cadence::{Cadence, Drift};
pub use scheduler::{PollReport, Scheduler, DEFAULT_POLL_BUDGET_MS};
