//! Match state and authoritative tick body

use std::fmt;

use tracing::{debug, info};

use crate::metrics::MetricsAggregator;
use crate::timing::Cadence;
use crate::util::time::{FRAME_PERIOD_MS, MAX_SUBSTEP_MS};
use crate::ws::protocol::{ClientMsg, ServerMsg, MATCH_TIMED_OUT, OPPONENT_DISCONNECTED};
use crate::ws::{ConnectionId, Transport};

use super::combat::Ballistics;
use super::session::ParticipantSession;
use super::simulation::{SimEvent, Side, Simulation};

/// Match id, unique within one coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match-{}", self.0)
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Ticking
    Running,
    /// Terminal messages sent
    Finished,
}

/// Everything a new match is built from
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub fire_rate_ms: u64,
    pub separation: f64,
    pub ballistics: Ballistics,
    /// Target wake period in (fractional) milliseconds
    pub frame_period_ms: f64,
    /// Largest simulation step
    pub max_substep_ms: u64,
    /// Running matches older than this are ended without a winner
    pub time_limit_ms: Option<u64>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            fire_rate_ms: 100,
            separation: 1000.0,
            ballistics: Ballistics::default(),
            frame_period_ms: FRAME_PERIOD_MS,
            max_substep_ms: MAX_SUBSTEP_MS,
            time_limit_ms: None,
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run again at this absolute time
    Continue(u64),
    /// Ready to be finished
    Finished,
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    /// The simulation produced a winner
    Decided(Side),
    /// One participant left; the other was told
    Abandoned { by: Side },
    /// Both participants left; nobody was told
    Deserted,
    /// Hit the time limit
    TimedOut,
    /// Finished from outside before any of the above
    Interrupted,
}

/// One running duel: two sessions, their simulation, and its wake schedule
pub struct GameMatch {
    id: MatchId,
    phase: MatchPhase,
    sim: Simulation,
    near: ParticipantSession,
    far: ParticipantSession,
    cadence: Cadence,
    max_substep_ms: u64,
    time_limit_ms: Option<u64>,
    started_at: u64,
    last_run: u64,
    timed_out: bool,
}

impl GameMatch {
    pub fn new(
        id: MatchId,
        near: ConnectionId,
        far: ConnectionId,
        settings: &MatchSettings,
        now: u64,
    ) -> Self {
        Self {
            id,
            phase: MatchPhase::Running,
            sim: Simulation::with_ballistics(
                settings.fire_rate_ms,
                settings.separation,
                settings.ballistics,
            ),
            near: ParticipantSession::new(near),
            far: ParticipantSession::new(far),
            cadence: Cadence::new(settings.frame_period_ms, now),
            max_substep_ms: settings.max_substep_ms.max(1),
            time_limit_ms: settings.time_limit_ms,
            started_at: now,
            last_run: now,
            timed_out: false,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn session(&self, side: Side) -> &ParticipantSession {
        match side {
            Side::Near => &self.near,
            Side::Far => &self.far,
        }
    }

    pub fn session_mut(&mut self, side: Side) -> &mut ParticipantSession {
        match side {
            Side::Near => &mut self.near,
            Side::Far => &mut self.far,
        }
    }

    /// Tell both participants the match started and return the first wake
    pub fn start(&mut self, transport: &mut dyn Transport, metrics: &mut MetricsAggregator) -> u64 {
        let start = ServerMsg::Start.to_json();
        transport.send(self.near.conn(), start.clone());
        transport.send(self.far.conn(), start);

        info!(
            match_id = %self.id,
            near = %self.near.conn(),
            far = %self.far.conn(),
            "Match started"
        );

        self.cadence.next_wake(self.started_at, metrics)
    }

    /// Advance the simulation to `now`, apply queued input, and decide
    /// whether the match goes on
    pub fn tick(&mut self, now: u64, metrics: &mut MetricsAggregator) -> TickOutcome {
        if self.phase == MatchPhase::Finished {
            return TickOutcome::Finished;
        }

        let mut remaining = now.saturating_sub(self.last_run);
        self.last_run = now;

        while remaining > 0 {
            let step = remaining.min(self.max_substep_ms);
            for event in self.sim.update(step) {
                if let SimEvent::Collision { .. } = event {
                    metrics.count("bulletsCollided");
                }
            }
            remaining -= step;
        }

        for side in [Side::Near, Side::Far] {
            let pending = self.session_mut(side).take_pending();
            for msg in pending {
                match msg {
                    ClientMsg::Fire => {
                        if !self.sim.fire(side) && !self.sim.ended() {
                            metrics.count("fireRateLimited");
                        }
                    }
                    ClientMsg::Unknown => {
                        debug!(match_id = %self.id, ?side, "Ignoring unknown client message");
                    }
                }
            }
        }

        if let Some(limit) = self.time_limit_ms {
            if now.saturating_sub(self.started_at) >= limit && !self.sim.ended() {
                self.timed_out = true;
            }
        }

        if self.sim.ended() || self.near.stopped() || self.far.stopped() || self.timed_out {
            return TickOutcome::Finished;
        }

        TickOutcome::Continue(self.cadence.next_wake(now, metrics))
    }

    /// Send terminal messages and release both connections. Returns `None`
    /// if the match was already finished.
    pub fn finish(&mut self, transport: &mut dyn Transport) -> Option<MatchEnd> {
        if self.phase == MatchPhase::Finished {
            return None;
        }
        self.phase = MatchPhase::Finished;

        let ticks = self.sim.ticks();
        let near_stats = self.sim.combatant(Side::Near);
        let far_stats = self.sim.combatant(Side::Far);

        let end = match (self.near.stopped(), self.far.stopped()) {
            (true, true) => MatchEnd::Deserted,
            (true, false) => {
                let msg = ServerMsg::stop(ticks, far_stats, Some(OPPONENT_DISCONNECTED));
                transport.send(self.far.conn(), msg.to_json());
                MatchEnd::Abandoned { by: Side::Near }
            }
            (false, true) => {
                let msg = ServerMsg::stop(ticks, near_stats, Some(OPPONENT_DISCONNECTED));
                transport.send(self.near.conn(), msg.to_json());
                MatchEnd::Abandoned { by: Side::Far }
            }
            (false, false) => {
                let (end, marker) = match (self.sim.winner(), self.timed_out) {
                    (Some(winner), _) => (MatchEnd::Decided(winner), None),
                    (None, true) => (MatchEnd::TimedOut, Some(MATCH_TIMED_OUT)),
                    (None, false) => (MatchEnd::Interrupted, None),
                };
                transport.send(
                    self.near.conn(),
                    ServerMsg::stop(ticks, near_stats, marker).to_json(),
                );
                transport.send(
                    self.far.conn(),
                    ServerMsg::stop(ticks, far_stats, marker).to_json(),
                );
                end
            }
        };

        transport.release(self.near.conn());
        transport.release(self.far.conn());

        info!(
            match_id = %self.id,
            ?end,
            ticks,
            near_fired = near_stats.fire_count,
            far_fired = far_stats.fire_count,
            "Match finished"
        );

        Some(end)
    }
}
