//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::combat::DEFAULT_BULLET_SPEED;
use crate::game::{Ballistics, MatchSettings};
use crate::lobby::LoopSettings;
use crate::matchmaking::CoordinatorSettings;
use crate::timing::DEFAULT_POLL_BUDGET_MS;
use crate::util::rate_limit::INBOUND_RATE_LIMIT;
use crate::util::time::{FRAME_PERIOD_MS, MAX_SUBSTEP_MS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Projectile speed in units per second
    pub bullet_speed: f64,
    /// Minimum logical time between accepted fires
    pub fire_rate_ms: u64,
    /// Distance of each combatant from the centre
    pub separation: f64,

    /// Minimum time between metrics reports
    pub report_interval_ms: u64,
    /// Wall-clock budget of one scheduler poll
    pub scheduler_budget_ms: u64,
    /// Log a milestone every this many finished matches
    pub milestone_every: u64,
    /// Inbound frames per second one connection may send
    pub inbound_rate_limit: u32,

    /// Release a lone waiting player after this long (unset = wait forever)
    pub waiting_timeout_ms: Option<u64>,
    /// End a running match after this long (unset = no limit)
    pub match_timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            bullet_speed: parse_or("BULLET_SPEED", defaults.bullet_speed)?,
            fire_rate_ms: parse_or("FIRE_RATE_MS", defaults.fire_rate_ms)?,
            separation: parse_or("SEPARATION", defaults.separation)?,

            report_interval_ms: parse_or("REPORT_INTERVAL_MS", defaults.report_interval_ms)?,
            scheduler_budget_ms: parse_or("SCHEDULER_BUDGET_MS", defaults.scheduler_budget_ms)?,
            milestone_every: parse_or("MILESTONE_EVERY", defaults.milestone_every)?,
            inbound_rate_limit: parse_or("INBOUND_RATE_LIMIT", defaults.inbound_rate_limit)?,

            waiting_timeout_ms: parse_opt("WAITING_TIMEOUT_MS")?,
            match_timeout_ms: parse_opt("MATCH_TIMEOUT_MS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bullet_speed.is_finite() && self.bullet_speed > 0.0) {
            return Err(ConfigError::OutOfRange("BULLET_SPEED"));
        }
        if !(self.separation.is_finite() && self.separation > 0.0) {
            return Err(ConfigError::OutOfRange("SEPARATION"));
        }
        if self.inbound_rate_limit == 0 {
            return Err(ConfigError::OutOfRange("INBOUND_RATE_LIMIT"));
        }
        Ok(())
    }

    /// Rules and timing every new match is created with
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            match_settings: MatchSettings {
                fire_rate_ms: self.fire_rate_ms,
                separation: self.separation,
                ballistics: Ballistics::with_speed(self.bullet_speed),
                frame_period_ms: FRAME_PERIOD_MS,
                max_substep_ms: MAX_SUBSTEP_MS,
                time_limit_ms: self.match_timeout_ms,
            },
            waiting_timeout_ms: self.waiting_timeout_ms,
            milestone_every: self.milestone_every,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            report_interval_ms: self.report_interval_ms,
            poll_budget_ms: self.scheduler_budget_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 42069)),
            log_level: "warn".to_string(),
            bullet_speed: DEFAULT_BULLET_SPEED,
            fire_rate_ms: 100,
            separation: 1000.0,
            report_interval_ms: 1000,
            scheduler_budget_ms: DEFAULT_POLL_BUDGET_MS,
            milestone_every: 100,
            inbound_rate_limit: INBOUND_RATE_LIMIT,
            waiting_timeout_ms: None,
            match_timeout_ms: None,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(key)?.unwrap_or(default))
}

fn parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Environment variable out of range: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
