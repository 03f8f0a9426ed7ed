//! Projectiles, ballistics constants and hit tests

use serde::Serialize;

/// Default projectile speed in units per second
pub const DEFAULT_BULLET_SPEED: f64 = 500.0;
/// Projectile hitbox radius
pub const BULLET_RADIUS: f64 = 12.0;
/// Combatant body radius
pub const PLAYER_RADIUS: f64 = 25.0;

/// Ballistics shared by every projectile of a simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ballistics {
    /// Units per second
    pub bullet_speed: f64,
    pub bullet_radius: f64,
    pub player_radius: f64,
}

impl Ballistics {
    pub fn with_speed(bullet_speed: f64) -> Self {
        Self {
            bullet_speed,
            ..Self::default()
        }
    }

    /// Distance a projectile covers in `delta_ms`
    pub fn travel(&self, delta_ms: u64) -> f64 {
        self.bullet_speed / 1000.0 * delta_ms as f64
    }

    /// Offset from a combatant's centre at which its projectiles spawn
    pub fn muzzle_offset(&self) -> f64 {
        self.player_radius + self.bullet_radius
    }
}

impl Default for Ballistics {
    fn default() -> Self {
        Self {
            bullet_speed: DEFAULT_BULLET_SPEED,
            bullet_radius: BULLET_RADIUS,
            player_radius: PLAYER_RADIUS,
        }
    }
}

/// Direction a combatant faces and its projectiles travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Facing {
    /// Towards +x
    Positive,
    /// Towards -x
    Negative,
}

impl Facing {
    pub fn sign(self) -> f64 {
        match self {
            Facing::Positive => 1.0,
            Facing::Negative => -1.0,
        }
    }
}

/// Projectile id, unique within one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectileId(pub u32);

/// Live projectile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projectile {
    pub id: ProjectileId,
    pub x: f64,
    pub direction: Facing,
}

impl Projectile {
    pub fn new(id: ProjectileId, x: f64, direction: Facing) -> Self {
        Self { id, x, direction }
    }

    pub fn advance(&mut self, distance: f64) {
        self.x += distance * self.direction.sign();
    }

    /// True once the projectile is inside the body of a combatant at
    /// `target_x`, measured along the projectile's own direction. A target
    /// already behind the projectile counts as reached, so a step longer than
    /// the body cannot tunnel through it.
    pub fn reaches(&self, target_x: f64, ballistics: &Ballistics) -> bool {
        (target_x - self.x) * self.direction.sign() < ballistics.player_radius
    }

    /// Two opposing projectiles annihilate below twice the bullet radius
    pub fn collides_with(&self, other: &Projectile, ballistics: &Ballistics) -> bool {
        (self.x - other.x).abs() < ballistics.bullet_radius * 2.0
    }
}
