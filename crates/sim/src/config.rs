//! Immutable per-segment simulation configuration.
//!
//! A `SimConfig` is built once (server side, from the player's profile and
//! remote balance values) and travels inside the signed session token. The
//! client and the verifying server construct their `Simulation` from the
//! same snapshot; nothing in here may change mid-session.

use thiserror::Error;

use crate::content::{ArtifactKind, FortressClass, HeroKind, MAX_TURRETS, Pillar, RelicKind, TurretKind};
use crate::fixed::{Fp, ONE, from_int, from_pct};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_TICK_RATE_HZ: u32 = 30;
pub const DEFAULT_SEGMENT_SIZE: u32 = 5;
pub const DEFAULT_FORTRESS_HP: i32 = 500;
pub const DEFAULT_FORTRESS_DAMAGE: Fp = from_int(12);
pub const DEFAULT_FORTRESS_ATTACK_INTERVAL: u32 = 20;
pub const DEFAULT_WAVE_INTERVAL: u32 = 90;
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 300;
pub const DEFAULT_MAX_WAVES: u32 = 100;

/// Commander levels beyond this grant no further stat bonuses.
pub const COMMANDER_BONUS_LEVEL_CAP: u32 = 50;

// ============================================================================
// Stat Bonuses
// ============================================================================

/// Flat additive bonuses carried in from outside the session
/// (commander level, guild stat boosts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatBonuses {
    pub damage: Fp,
    pub max_hp: Fp,
    pub gold: Fp,
    pub xp: Fp,
}

impl StatBonuses {
    /// +1% damage, +2% max HP and +0.5% gold per commander level, capped.
    pub fn for_commander_level(level: u32) -> Self {
        let lvl = level.min(COMMANDER_BONUS_LEVEL_CAP) as i32;
        Self {
            damage: from_pct(lvl),
            max_hp: from_pct(2 * lvl),
            gold: from_pct(lvl) / 2,
            xp: 0,
        }
    }

    /// Component-wise sum.
    pub fn combine(self, other: Self) -> Self {
        Self {
            damage: self.damage.saturating_add(other.damage),
            max_hp: self.max_hp.saturating_add(other.max_hp),
            gold: self.gold.saturating_add(other.gold),
            xp: self.xp.saturating_add(other.xp),
        }
    }
}

// ============================================================================
// SimConfig
// ============================================================================

/// A turret placed in a slot at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurretPlacement {
    pub kind: TurretKind,
    pub slot: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub tick_rate_hz: u32,
    /// Waves per verification segment.
    pub segment_size: u32,
    pub fortress_class: FortressClass,
    pub fortress_base_hp: i32,
    pub fortress_base_damage: Fp,
    pub fortress_attack_interval: u32,
    /// Ticks between a wave's completion (and relic choice) and the next spawn.
    pub wave_interval: u32,
    /// Scheduled checkpoint cadence in ticks.
    pub checkpoint_interval: u32,
    pub commander_level: u32,
    pub unlocked_heroes: Vec<HeroKind>,
    pub unlocked_turrets: Vec<TurretKind>,
    pub unlocked_pillars: Vec<Pillar>,
    /// Heroes fielded this session (must be unlocked).
    pub heroes: Vec<HeroKind>,
    /// Turrets fielded this session (must be unlocked).
    pub turrets: Vec<TurretPlacement>,
    pub stat_bonuses: StatBonuses,
    pub equipped_artifacts: Vec<ArtifactKind>,
    pub starting_relics: Vec<RelicKind>,
    /// Waves already verified before this segment.
    pub start_wave: u32,
    pub endless: bool,
    /// Victory wave when not endless.
    pub max_waves: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            segment_size: DEFAULT_SEGMENT_SIZE,
            fortress_class: FortressClass::Fire,
            fortress_base_hp: DEFAULT_FORTRESS_HP,
            fortress_base_damage: DEFAULT_FORTRESS_DAMAGE,
            fortress_attack_interval: DEFAULT_FORTRESS_ATTACK_INTERVAL,
            wave_interval: DEFAULT_WAVE_INTERVAL,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            commander_level: 1,
            unlocked_heroes: vec![HeroKind::Pyromancer],
            unlocked_turrets: vec![TurretKind::Flamethrower],
            unlocked_pillars: vec![Pillar::Streets],
            heroes: vec![HeroKind::Pyromancer],
            turrets: vec![TurretPlacement {
                kind: TurretKind::Flamethrower,
                slot: 0,
            }],
            stat_bonuses: StatBonuses::for_commander_level(1),
            equipped_artifacts: Vec::new(),
            starting_relics: Vec::new(),
            start_wave: 0,
            endless: true,
            max_waves: DEFAULT_MAX_WAVES,
        }
    }
}

/// Malformed configuration snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick_rate_hz must be positive")]
    ZeroTickRate,

    #[error("segment_size must be positive")]
    ZeroSegmentSize,

    #[error("fortress_base_hp must be positive, got {0}")]
    InvalidFortressHp(i32),

    #[error("fortress_base_damage must be positive, got {0}")]
    InvalidFortressDamage(Fp),

    #[error("{field} must be positive")]
    ZeroInterval { field: &'static str },

    #[error("hero {0:?} is fielded but not unlocked")]
    HeroLocked(HeroKind),

    #[error("hero {0:?} is fielded twice")]
    DuplicateHero(HeroKind),

    #[error("turret {0:?} is fielded but not unlocked")]
    TurretLocked(TurretKind),

    #[error("turret slot {0} is out of range or occupied twice")]
    InvalidTurretSlot(u8),

    #[error("at most 6 turrets may be fielded, got {0}")]
    TooManyTurrets(usize),

    #[error("relic {0:?} is listed twice")]
    DuplicateRelic(RelicKind),

    #[error("start_wave {start_wave} is at or past max_waves {max_waves}")]
    StartPastVictory { start_wave: u32, max_waves: u32 },
}

impl SimConfig {
    /// Check the snapshot is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.fortress_base_hp <= 0 {
            return Err(ConfigError::InvalidFortressHp(self.fortress_base_hp));
        }
        if self.fortress_base_damage <= 0 {
            return Err(ConfigError::InvalidFortressDamage(self.fortress_base_damage));
        }
        for (field, value) in [
            ("fortress_attack_interval", self.fortress_attack_interval),
            ("wave_interval", self.wave_interval),
            ("checkpoint_interval", self.checkpoint_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }

        for (i, hero) in self.heroes.iter().enumerate() {
            if !self.unlocked_heroes.contains(hero) {
                return Err(ConfigError::HeroLocked(*hero));
            }
            if self.heroes[..i].contains(hero) {
                return Err(ConfigError::DuplicateHero(*hero));
            }
        }

        if self.turrets.len() > MAX_TURRETS {
            return Err(ConfigError::TooManyTurrets(self.turrets.len()));
        }
        for (i, placement) in self.turrets.iter().enumerate() {
            if !self.unlocked_turrets.contains(&placement.kind) {
                return Err(ConfigError::TurretLocked(placement.kind));
            }
            let reused = self.turrets[..i].iter().any(|p| p.slot == placement.slot);
            if placement.slot as usize >= MAX_TURRETS || reused {
                return Err(ConfigError::InvalidTurretSlot(placement.slot));
            }
        }

        for (i, relic) in self.starting_relics.iter().enumerate() {
            if self.starting_relics[..i].contains(relic) {
                return Err(ConfigError::DuplicateRelic(*relic));
            }
        }

        if !self.endless && self.start_wave >= self.max_waves {
            return Err(ConfigError::StartPastVictory {
                start_wave: self.start_wave,
                max_waves: self.max_waves,
            });
        }

        Ok(())
    }

    /// Wave at which this segment is complete.
    pub fn target_wave(&self) -> u32 {
        let target = self.start_wave.saturating_add(self.segment_size);
        if self.endless {
            target
        } else {
            target.min(self.max_waves)
        }
    }

    /// Fortress max HP after stat bonuses (relic/artifact bonuses are applied
    /// by the modifier resolver).
    pub fn fortress_max_hp(&self, max_hp_bonus: Fp) -> i32 {
        let scale = ONE.saturating_add(max_hp_bonus);
        ((i64::from(self.fortress_base_hp) * i64::from(scale)) >> 16).clamp(1, i64::from(i32::MAX))
            as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_commander_bonus_capped() {
        let low = StatBonuses::for_commander_level(10);
        assert_eq!(low.damage, from_pct(10));
        assert_eq!(low.max_hp, from_pct(20));

        let capped = StatBonuses::for_commander_level(500);
        assert_eq!(capped, StatBonuses::for_commander_level(COMMANDER_BONUS_LEVEL_CAP));
    }

    #[test]
    fn test_locked_hero_rejected() {
        let config = SimConfig {
            heroes: vec![HeroKind::Druid],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::HeroLocked(HeroKind::Druid)));
    }

    #[test]
    fn test_turret_slot_collision_rejected() {
        let config = SimConfig {
            turrets: vec![
                TurretPlacement {
                    kind: TurretKind::Flamethrower,
                    slot: 2,
                },
                TurretPlacement {
                    kind: TurretKind::Flamethrower,
                    slot: 2,
                },
            ],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTurretSlot(2)));
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        let config = SimConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickRate));
    }

    #[test]
    fn test_target_wave() {
        let config = SimConfig {
            start_wave: 10,
            ..Default::default()
        };
        assert_eq!(config.target_wave(), 15);

        let finite = SimConfig {
            start_wave: 8,
            endless: false,
            max_waves: 10,
            ..Default::default()
        };
        assert_eq!(finite.target_wave(), 10);
    }

    #[test]
    fn test_fortress_max_hp_bonus() {
        let config = SimConfig::default();
        assert_eq!(config.fortress_max_hp(0), 500);
        assert_eq!(config.fortress_max_hp(ONE / 2), 750);
    }
}
