//! Game content: fortress classes, heroes, turrets, enemies, relics,
//! pillars, artifacts and materials, with their balance tables.
//!
//! Every enum here is closed and fieldless (except `Special`), and its
//! `ALL` array lists variants in discriminant order so `id()` / `from_id()`
//! give a stable wire encoding.

use crate::fixed::{Fp, ONE, from_int, from_pct, from_ratio};

// ============================================================================
// Field Geometry
// ============================================================================

/// Number of lanes enemies walk along.
pub const LANE_COUNT: u8 = 3;

/// X coordinate where enemies spawn.
pub const FIELD_END_X: Fp = from_int(40);

/// Front face of the fortress.
pub const FORTRESS_X: Fp = from_int(2);

/// Melee enemies stop here and attack.
pub const ENEMY_STOP_X: Fp = from_int(5);

/// Heroes stand in their lane at this x.
pub const HERO_X: Fp = from_int(4);

/// Maximum turret slots (two rows of three lanes).
pub const MAX_TURRETS: usize = 6;

/// Walls must be placed in this x range.
pub const WALL_MIN_X: Fp = from_int(8);
pub const WALL_MAX_X: Fp = from_int(30);

/// Y coordinate of a lane's centre line.
pub const fn lane_y(lane: u8) -> Fp {
    from_int(2 + 3 * lane as i32)
}

/// Position of turret slot `slot`.
pub const fn turret_slot_position(slot: u8) -> (Fp, Fp) {
    let lane = slot % LANE_COUNT;
    let row = (slot / LANE_COUNT) as i32;
    (from_int(1) + row * ONE, lane_y(lane))
}

// ============================================================================
// Fortress Classes
// ============================================================================

/// Elemental class shared by fortress, heroes and turrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FortressClass {
    Fire,
    Ice,
    Lightning,
    Natural,
    Tech,
}

impl FortressClass {
    pub const ALL: [Self; 5] = [Self::Fire, Self::Ice, Self::Lightning, Self::Natural, Self::Tech];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Status effect applied by this class's attacks, if any.
    pub const fn on_hit_status(self) -> Option<StatusKind> {
        match self {
            Self::Fire => Some(StatusKind::Burn),
            Self::Ice => Some(StatusKind::Slow),
            Self::Natural => Some(StatusKind::Poison),
            Self::Lightning | Self::Tech => None,
        }
    }
}

// ============================================================================
// Status Effects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusKind {
    /// Damage every pulse; strong, short.
    Burn,
    /// Damage every pulse; weak, long.
    Poison,
    /// Movement speed reduced by `magnitude`.
    Slow,
    /// No movement, no attacks.
    Freeze,
}

impl StatusKind {
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// (duration ticks, magnitude) when applied by a hit of `damage`.
    pub fn default_application(self, damage: i32) -> (u32, Fp) {
        match self {
            Self::Burn => (90, from_ratio(damage.max(1), 5)),
            Self::Poison => (180, from_ratio(damage.max(1), 10)),
            Self::Slow => (60, from_pct(35)),
            Self::Freeze => (45, ONE),
        }
    }
}

/// Damage-over-time effects pulse on this cadence.
pub const STATUS_PULSE_TICKS: u32 = 10;

// ============================================================================
// Heroes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeroKind {
    Pyromancer,
    Blazeguard,
    Cryomancer,
    Stormcaller,
    Druid,
    Engineer,
}

/// Active skill triggered by an `ActivateHeroSkill` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillKind {
    /// Area damage and burn around the densest enemy cluster.
    Inferno,
    /// Freeze every enemy near the highest-priority target.
    Blizzard,
    /// Strike the top priority targets.
    Thunderstrike,
    /// Heal the fortress.
    Rejuvenate,
    /// Massive hit on the enemy with the most HP.
    Overclock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeroStats {
    pub class: FortressClass,
    pub damage: Fp,
    pub range: Fp,
    pub attack_interval: u32,
    pub max_hp: i32,
    pub skill: SkillKind,
    pub skill_cooldown: u32,
}

impl HeroKind {
    pub const ALL: [Self; 6] = [
        Self::Pyromancer,
        Self::Blazeguard,
        Self::Cryomancer,
        Self::Stormcaller,
        Self::Druid,
        Self::Engineer,
    ];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub const fn stats(self) -> HeroStats {
        match self {
            Self::Pyromancer => HeroStats {
                class: FortressClass::Fire,
                damage: from_int(14),
                range: from_int(9),
                attack_interval: 24,
                max_hp: 120,
                skill: SkillKind::Inferno,
                skill_cooldown: 600,
            },
            Self::Blazeguard => HeroStats {
                class: FortressClass::Fire,
                damage: from_int(20),
                range: from_int(4),
                attack_interval: 30,
                max_hp: 220,
                skill: SkillKind::Inferno,
                skill_cooldown: 750,
            },
            Self::Cryomancer => HeroStats {
                class: FortressClass::Ice,
                damage: from_int(10),
                range: from_int(10),
                attack_interval: 24,
                max_hp: 100,
                skill: SkillKind::Blizzard,
                skill_cooldown: 720,
            },
            Self::Stormcaller => HeroStats {
                class: FortressClass::Lightning,
                damage: from_int(12),
                range: from_int(11),
                attack_interval: 20,
                max_hp: 90,
                skill: SkillKind::Thunderstrike,
                skill_cooldown: 540,
            },
            Self::Druid => HeroStats {
                class: FortressClass::Natural,
                damage: from_int(8),
                range: from_int(9),
                attack_interval: 20,
                max_hp: 140,
                skill: SkillKind::Rejuvenate,
                skill_cooldown: 900,
            },
            Self::Engineer => HeroStats {
                class: FortressClass::Tech,
                damage: from_int(16),
                range: from_int(12),
                attack_interval: 28,
                max_hp: 110,
                skill: SkillKind::Overclock,
                skill_cooldown: 660,
            },
        }
    }
}

// ============================================================================
// Turrets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TurretKind {
    Flamethrower,
    FrostSpire,
    TeslaCoil,
    ThornLauncher,
    Cannon,
    Ballista,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurretStats {
    pub class: FortressClass,
    pub damage: Fp,
    pub range: Fp,
    pub attack_interval: u32,
    pub max_hp: i32,
    pub projectile_speed: Fp,
}

impl TurretKind {
    pub const ALL: [Self; 6] = [
        Self::Flamethrower,
        Self::FrostSpire,
        Self::TeslaCoil,
        Self::ThornLauncher,
        Self::Cannon,
        Self::Ballista,
    ];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub const fn stats(self) -> TurretStats {
        match self {
            Self::Flamethrower => TurretStats {
                class: FortressClass::Fire,
                damage: from_int(9),
                range: from_int(12),
                attack_interval: 18,
                max_hp: 150,
                projectile_speed: from_ratio(3, 5),
            },
            Self::FrostSpire => TurretStats {
                class: FortressClass::Ice,
                damage: from_int(7),
                range: from_int(16),
                attack_interval: 24,
                max_hp: 150,
                projectile_speed: from_ratio(7, 10),
            },
            Self::TeslaCoil => TurretStats {
                class: FortressClass::Lightning,
                damage: from_int(8),
                range: from_int(14),
                attack_interval: 20,
                max_hp: 130,
                projectile_speed: from_int(1),
            },
            Self::ThornLauncher => TurretStats {
                class: FortressClass::Natural,
                damage: from_int(6),
                range: from_int(15),
                attack_interval: 16,
                max_hp: 170,
                projectile_speed: from_ratio(3, 5),
            },
            Self::Cannon => TurretStats {
                class: FortressClass::Tech,
                damage: from_int(18),
                range: from_int(18),
                attack_interval: 40,
                max_hp: 200,
                projectile_speed: from_ratio(1, 2),
            },
            Self::Ballista => TurretStats {
                class: FortressClass::Tech,
                damage: from_int(12),
                range: from_int(22),
                attack_interval: 30,
                max_hp: 140,
                projectile_speed: from_ratio(9, 10),
            },
        }
    }
}

// ============================================================================
// Enemies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnemyKind {
    Grunt,
    Runner,
    Brute,
    Swarmling,
    Siegebreaker,
    Mender,
    Warden,
    Phaser,
    Sapper,
    Overlord,
}

/// Per-type special behaviour. Closed set: one handler per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    None,
    /// Stops at `range` from the fortress and bombards the fortress or a turret.
    Siege { range: Fp, interval: u32, damage: i32 },
    /// Heals nearby allies.
    HealAura { radius: Fp, amount: i32, interval: u32 },
    /// Grants shields to nearby allies.
    ShieldAura { radius: Fp, shield: i32, interval: u32 },
    /// Blinks forward by `distance` (jittered by the RNG).
    Teleport { distance: Fp, interval: u32 },
    /// Seeks out walls and deals multiplied damage to them.
    WallBreaker { wall_damage_multiplier: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnemyStats {
    pub max_hp: i32,
    /// Units per tick.
    pub speed: Fp,
    pub damage: i32,
    pub attack_interval: u32,
    pub gold: u32,
    /// Targeting danger weight.
    pub danger: Fp,
    pub special: Special,
}

impl EnemyKind {
    pub const ALL: [Self; 10] = [
        Self::Grunt,
        Self::Runner,
        Self::Brute,
        Self::Swarmling,
        Self::Siegebreaker,
        Self::Mender,
        Self::Warden,
        Self::Phaser,
        Self::Sapper,
        Self::Overlord,
    ];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub const fn is_boss(self) -> bool {
        matches!(self, Self::Overlord)
    }

    pub const fn stats(self) -> EnemyStats {
        match self {
            Self::Grunt => EnemyStats {
                max_hp: 30,
                speed: from_pct(6),
                damage: 4,
                attack_interval: 30,
                gold: 2,
                danger: from_int(1),
                special: Special::None,
            },
            Self::Runner => EnemyStats {
                max_hp: 18,
                speed: from_pct(11),
                damage: 3,
                attack_interval: 20,
                gold: 2,
                danger: from_int(2),
                special: Special::None,
            },
            Self::Brute => EnemyStats {
                max_hp: 90,
                speed: from_pct(4),
                damage: 10,
                attack_interval: 45,
                gold: 5,
                danger: from_int(3),
                special: Special::None,
            },
            Self::Swarmling => EnemyStats {
                max_hp: 10,
                speed: from_pct(8),
                damage: 2,
                attack_interval: 15,
                gold: 1,
                danger: from_ratio(1, 2),
                special: Special::None,
            },
            Self::Siegebreaker => EnemyStats {
                max_hp: 45,
                speed: from_ratio(9, 200),
                damage: 3,
                attack_interval: 30,
                gold: 6,
                danger: from_int(5),
                special: Special::Siege {
                    range: from_int(14),
                    interval: 75,
                    damage: 9,
                },
            },
            Self::Mender => EnemyStats {
                max_hp: 35,
                speed: from_pct(5),
                damage: 2,
                attack_interval: 30,
                gold: 5,
                danger: from_int(4),
                special: Special::HealAura {
                    radius: from_int(4),
                    amount: 6,
                    interval: 60,
                },
            },
            Self::Warden => EnemyStats {
                max_hp: 50,
                speed: from_pct(5),
                damage: 3,
                attack_interval: 30,
                gold: 5,
                danger: from_int(4),
                special: Special::ShieldAura {
                    radius: from_int(4),
                    shield: 10,
                    interval: 90,
                },
            },
            Self::Phaser => EnemyStats {
                max_hp: 28,
                speed: from_pct(6),
                damage: 5,
                attack_interval: 30,
                gold: 4,
                danger: from_int(3),
                special: Special::Teleport {
                    distance: from_int(5),
                    interval: 120,
                },
            },
            Self::Sapper => EnemyStats {
                max_hp: 32,
                speed: from_pct(7),
                damage: 5,
                attack_interval: 30,
                gold: 4,
                danger: from_int(2),
                special: Special::WallBreaker {
                    wall_damage_multiplier: 4,
                },
            },
            Self::Overlord => EnemyStats {
                max_hp: 600,
                speed: from_pct(3),
                damage: 25,
                attack_interval: 40,
                gold: 60,
                danger: from_int(10),
                special: Special::ShieldAura {
                    radius: from_int(6),
                    shield: 25,
                    interval: 150,
                },
            },
        }
    }
}

// ============================================================================
// Pillars
// ============================================================================

/// Thematic chapter; ten waves each, cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pillar {
    Streets,
    Science,
    Cosmos,
    Magic,
    Gods,
}

/// Waves per pillar.
pub const WAVES_PER_PILLAR: u32 = 10;

impl Pillar {
    pub const ALL: [Self; 5] = [Self::Streets, Self::Science, Self::Cosmos, Self::Magic, Self::Gods];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Pillar for `wave`, falling back to `Streets` when it isn't unlocked.
    pub fn for_wave(wave: u32, unlocked: &[Pillar]) -> Self {
        let idx = (wave.saturating_sub(1) / WAVES_PER_PILLAR) as usize % Self::ALL.len();
        let pillar = Self::ALL[idx];
        if pillar == Self::Streets || unlocked.contains(&pillar) {
            pillar
        } else {
            Self::Streets
        }
    }

    /// Enemies that may spawn in this pillar (bosses excluded).
    pub const fn enemy_pool(self) -> &'static [EnemyKind] {
        match self {
            Self::Streets => &[EnemyKind::Grunt, EnemyKind::Runner, EnemyKind::Brute, EnemyKind::Sapper],
            Self::Science => &[
                EnemyKind::Grunt,
                EnemyKind::Runner,
                EnemyKind::Siegebreaker,
                EnemyKind::Warden,
                EnemyKind::Sapper,
            ],
            Self::Cosmos => &[
                EnemyKind::Runner,
                EnemyKind::Swarmling,
                EnemyKind::Phaser,
                EnemyKind::Siegebreaker,
            ],
            Self::Magic => &[
                EnemyKind::Grunt,
                EnemyKind::Mender,
                EnemyKind::Phaser,
                EnemyKind::Warden,
                EnemyKind::Swarmling,
            ],
            Self::Gods => &[
                EnemyKind::Brute,
                EnemyKind::Mender,
                EnemyKind::Warden,
                EnemyKind::Siegebreaker,
                EnemyKind::Phaser,
            ],
        }
    }

    /// Materials this pillar drops, in roll order.
    pub const fn material_pool(self) -> &'static [MaterialKind] {
        match self {
            Self::Streets => &[MaterialKind::Scrap],
            Self::Science => &[MaterialKind::Scrap, MaterialKind::Crystal],
            Self::Cosmos => &[MaterialKind::Crystal, MaterialKind::Essence],
            Self::Magic => &[MaterialKind::Essence, MaterialKind::Crystal],
            Self::Gods => &[MaterialKind::Essence, MaterialKind::Relicite],
        }
    }
}

// ============================================================================
// Relics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelicKind {
    SharpenedArrows,
    Quickdraw,
    LuckyCharm,
    CriticalMass,
    Executioner,
    Berserker,
    StormCore,
    Piercer,
    Shrapnel,
    EliteHunter,
    Fortify,
    Goldfinder,
    Scholar,
    TeamSpirit,
    Regrowth,
    Timewarp,
}

impl RelicKind {
    pub const ALL: [Self; 16] = [
        Self::SharpenedArrows,
        Self::Quickdraw,
        Self::LuckyCharm,
        Self::CriticalMass,
        Self::Executioner,
        Self::Berserker,
        Self::StormCore,
        Self::Piercer,
        Self::Shrapnel,
        Self::EliteHunter,
        Self::Fortify,
        Self::Goldfinder,
        Self::Scholar,
        Self::TeamSpirit,
        Self::Regrowth,
        Self::Timewarp,
    ];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

/// Relic options offered per choice window.
pub const RELIC_CHOICES: usize = 3;

// ============================================================================
// Artifacts & Materials
// ============================================================================

/// Persistent equipment brought into a session via the config snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    WarBanner,
    AegisPlate,
    MidasRing,
    ChronoGear,
    SeekersLens,
}

impl ArtifactKind {
    pub const ALL: [Self; 5] = [
        Self::WarBanner,
        Self::AegisPlate,
        Self::MidasRing,
        Self::ChronoGear,
        Self::SeekersLens,
    ];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaterialKind {
    Scrap,
    Crystal,
    Essence,
    Relicite,
}

impl MaterialKind {
    pub const ALL: [Self; 4] = [Self::Scrap, Self::Crystal, Self::Essence, Self::Relicite];

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

// ============================================================================
// Economy
// ============================================================================

pub const WALL_COST: u32 = 25;
pub const WALL_HP: i32 = 150;
pub const MILITIA_COST: u32 = 20;
pub const MILITIA_SQUAD_SIZE: u8 = 3;
pub const MILITIA_HP: i32 = 25;
pub const MILITIA_DAMAGE: i32 = 4;
pub const MILITIA_LIFETIME: u32 = 600;
pub const REROLL_COST: u32 = 15;
