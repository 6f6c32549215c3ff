//! Collaborators the server consults outside the simulation.
//!
//! Each is read once per request and injected as plain data into the
//! `SimConfig` or the reward calculation, never during a tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bastion_sim::config::{
    DEFAULT_FORTRESS_DAMAGE, DEFAULT_FORTRESS_HP, DEFAULT_WAVE_INTERVAL, StatBonuses,
};
use bastion_sim::fixed::{Fp, ONE};

// ============================================================================
// Remote Config
// ============================================================================

/// Tunable balance constants delivered by remote config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceConfig {
    pub fortress_base_hp: i32,
    pub fortress_base_damage: Fp,
    pub wave_interval: u32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            fortress_base_hp: DEFAULT_FORTRESS_HP,
            fortress_base_damage: DEFAULT_FORTRESS_DAMAGE,
            wave_interval: DEFAULT_WAVE_INTERVAL,
        }
    }
}

pub trait RemoteConfigProvider: Send + Sync {
    fn balance(&self) -> BalanceConfig;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRemoteConfig(pub BalanceConfig);

impl RemoteConfigProvider for StaticRemoteConfig {
    fn balance(&self) -> BalanceConfig {
        self.0
    }
}

// ============================================================================
// Event Multipliers
// ============================================================================

/// Time-limited reward multipliers (Q16.16, `ONE` = no boost).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMultipliers {
    pub gold: Fp,
    pub xp: Fp,
}

impl Default for EventMultipliers {
    fn default() -> Self {
        Self { gold: ONE, xp: ONE }
    }
}

pub trait EventMultiplierProvider: Send + Sync {
    fn multipliers_at(&self, now_ms: u64) -> EventMultipliers;
}

/// Fixed multipliers, optionally limited to `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEventMultipliers {
    pub multipliers: EventMultipliers,
    pub window: Option<(u64, u64)>,
}

impl StaticEventMultipliers {
    pub fn always(multipliers: EventMultipliers) -> Self {
        Self {
            multipliers,
            window: None,
        }
    }
}

impl EventMultiplierProvider for StaticEventMultipliers {
    fn multipliers_at(&self, now_ms: u64) -> EventMultipliers {
        match self.window {
            Some((start, end)) if !(start..end).contains(&now_ms) => EventMultipliers::default(),
            _ => self.multipliers,
        }
    }
}

// ============================================================================
// Guild Bonus
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuildBonus {
    /// Added to the gold reward factor (Q16.16).
    pub gold_bonus: Fp,
    pub xp_bonus: Fp,
    /// Folded into the segment's `SimConfig::stat_bonuses`.
    pub stat_boosts: StatBonuses,
}

pub trait GuildBonusProvider: Send + Sync {
    fn bonus_for(&self, user_id: &str) -> GuildBonus;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoGuild;

impl GuildBonusProvider for NoGuild {
    fn bonus_for(&self, _user_id: &str) -> GuildBonus {
        GuildBonus::default()
    }
}

/// Same bonus for every user.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticGuildBonus(pub GuildBonus);

impl GuildBonusProvider for StaticGuildBonus {
    fn bonus_for(&self, _user_id: &str) -> GuildBonus {
        self.0
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
