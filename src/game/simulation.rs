//! Deterministic duel simulation for a single match

use serde::Serialize;
use tracing::{debug, info};

use super::combat::{Ballistics, Facing, Projectile, ProjectileId};

/// Fixed role of a combatant within a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Starts at -separation, fires towards +x
    Near,
    /// Starts at +separation, fires towards -x
    Far,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Near => Side::Far,
            Side::Far => Side::Near,
        }
    }
}

/// Authoritative state of one combatant
#[derive(Debug, Clone, Serialize)]
pub struct CombatantState {
    pub side: Side,
    pub x: f64,
    pub facing: Facing,
    /// Accepted fires
    pub fire_count: u32,
    pub won: bool,
    /// Logical time this combatant has been simulated for
    pub elapsed_ms: u64,
    /// Logical time of the last accepted fire
    pub last_fire: Option<u64>,
    pub projectiles: Vec<Projectile>,
}

impl CombatantState {
    fn new(side: Side, x: f64, facing: Facing) -> Self {
        Self {
            side,
            x,
            facing,
            fire_count: 0,
            won: false,
            elapsed_ms: 0,
            last_fire: None,
            projectiles: Vec::new(),
        }
    }
}

/// Something that happened during one `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A projectile reached the opposing body and ended the match
    Hit { winner: Side, projectile: ProjectileId },
    /// Two opposing projectiles annihilated each other
    Collision { near: ProjectileId, far: ProjectileId },
}

/// One match worth of duel state
#[derive(Debug, Clone)]
pub struct Simulation {
    near: CombatantState,
    far: CombatantState,
    ballistics: Ballistics,
    fire_rate_ms: u64,
    /// Logical clock, advanced only by `update`
    clock_ms: u64,
    ticks: u64,
    ended: bool,
    next_projectile: u32,
}

impl Simulation {
    /// Create a simulation with default ballistics
    pub fn new(fire_rate_ms: u64, separation: f64) -> Self {
        Self::with_ballistics(fire_rate_ms, separation, Ballistics::default())
    }

    pub fn with_ballistics(fire_rate_ms: u64, separation: f64, ballistics: Ballistics) -> Self {
        Self {
            near: CombatantState::new(Side::Near, -separation, Facing::Positive),
            far: CombatantState::new(Side::Far, separation, Facing::Negative),
            ballistics,
            fire_rate_ms,
            clock_ms: 0,
            ticks: 0,
            ended: false,
            next_projectile: 0,
        }
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Number of `update` steps applied so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn winner(&self) -> Option<Side> {
        if self.near.won {
            Some(Side::Near)
        } else if self.far.won {
            Some(Side::Far)
        } else {
            None
        }
    }

    pub fn combatant(&self, side: Side) -> &CombatantState {
        match side {
            Side::Near => &self.near,
            Side::Far => &self.far,
        }
    }

    /// Both combatants, near first
    pub fn stats(&self) -> [&CombatantState; 2] {
        [&self.near, &self.far]
    }

    /// Fire for `side`. Returns false when the fire was dropped by the rate
    /// limit or because the match is over.
    pub fn fire(&mut self, side: Side) -> bool {
        if self.ended {
            return false;
        }

        let now = self.clock_ms;
        if let Some(last) = self.combatant(side).last_fire {
            if now - last < self.fire_rate_ms {
                debug!(?side, now, last, "Early fire dropped");
                return false;
            }
        }

        self.next_projectile += 1;
        let id = ProjectileId(self.next_projectile);
        let muzzle_offset = self.ballistics.muzzle_offset();

        let state = self.combatant_mut(side);
        state.last_fire = Some(now);
        state.fire_count += 1;
        let x = state.x + muzzle_offset * state.facing.sign();
        state.projectiles.push(Projectile::new(id, x, state.facing));

        debug!(?side, projectile = id.0, x, fire_count = state.fire_count, "Projectile fired");
        true
    }

    /// Advance the match by `delta_ms` of logical time.
    ///
    /// Hits are checked before collisions: far side projectiles first, then
    /// near side. A hit ends the match on the spot and no collision of the
    /// same step is resolved.
    pub fn update(&mut self, delta_ms: u64) -> Vec<SimEvent> {
        if self.ended {
            return Vec::new();
        }

        self.clock_ms += delta_ms;
        self.ticks += 1;

        let distance = self.ballistics.travel(delta_ms);
        for state in [&mut self.near, &mut self.far] {
            state.elapsed_ms += delta_ms;
            for projectile in &mut state.projectiles {
                projectile.advance(distance);
            }
        }

        if let Some(hit) = self.find_hit(Side::Far) {
            self.declare_winner(Side::Far);
            return vec![SimEvent::Hit {
                winner: Side::Far,
                projectile: hit,
            }];
        }

        if let Some(hit) = self.find_hit(Side::Near) {
            self.declare_winner(Side::Near);
            return vec![SimEvent::Hit {
                winner: Side::Near,
                projectile: hit,
            }];
        }

        self.resolve_collisions()
    }

    fn combatant_mut(&mut self, side: Side) -> &mut CombatantState {
        match side {
            Side::Near => &mut self.near,
            Side::Far => &mut self.far,
        }
    }

    /// First projectile of `shooter` inside the opponent's body
    fn find_hit(&self, shooter: Side) -> Option<ProjectileId> {
        let target_x = self.combatant(shooter.opponent()).x;
        self.combatant(shooter)
            .projectiles
            .iter()
            .find(|p| p.reaches(target_x, &self.ballistics))
            .map(|p| p.id)
    }

    fn declare_winner(&mut self, winner: Side) {
        self.combatant_mut(winner).won = true;
        self.combatant_mut(winner.opponent()).won = false;
        self.ended = true;

        info!(
            ?winner,
            ticks = self.ticks,
            clock_ms = self.clock_ms,
            near_fired = self.near.fire_count,
            far_fired = self.far.fire_count,
            "Duel decided"
        );
    }

    fn resolve_collisions(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let mut spent_far: Vec<ProjectileId> = Vec::new();

        for near in &self.near.projectiles {
            let hit = self
                .far
                .projectiles
                .iter()
                .find(|far| !spent_far.contains(&far.id) && near.collides_with(far, &self.ballistics));

            if let Some(far) = hit {
                debug!(near = near.id.0, far = far.id.0, x = near.x, "Projectiles collided");
                spent_far.push(far.id);
                events.push(SimEvent::Collision {
                    near: near.id,
                    far: far.id,
                });
            }
        }

        if !events.is_empty() {
            let spent_near: Vec<ProjectileId> = events
                .iter()
                .filter_map(|e| match e {
                    SimEvent::Collision { near, .. } => Some(*near),
                    SimEvent::Hit { .. } => None,
                })
                .collect();

            self.near.projectiles.retain(|p| !spent_near.contains(&p.id));
            self.far.projectiles.retain(|p| !spent_far.contains(&p.id));
        }

        events
    }
}
