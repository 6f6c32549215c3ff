//! Modifier and synergy resolution.
//!
//! Pure functions from the current roster (heroes, turrets, fortress class,
//! pillar, relics, artifacts, external stat bonuses) to a combined
//! `Modifiers` record. Synergy is recomputed every tick because heroes die
//! and turrets get destroyed; pillar modifiers only change with the wave and
//! are refreshed on a slower cadence by the simulation.

use crate::config::StatBonuses;
use crate::content::{ArtifactKind, FortressClass, Pillar, RelicKind, WAVES_PER_PILLAR};
use crate::fixed::{Fp, ONE, from_int, from_pct};
use crate::state::{Hero, Turret};

// ============================================================================
// Synergy
// ============================================================================

/// Damage bonus for at least one hero matching the fortress class.
pub const HERO_SYNERGY_DAMAGE: Fp = from_pct(30);
/// Damage bonus for at least one turret matching the fortress class.
pub const TURRET_SYNERGY_DAMAGE: Fp = from_pct(15);
/// Attack-speed bonus for at least one matching turret.
pub const TURRET_SYNERGY_ATTACK_SPEED: Fp = from_pct(15);
/// Extra damage once full synergy is reached, layered on the partial bonuses.
pub const FULL_SYNERGY_DAMAGE: Fp = from_pct(50);
/// Extra crit chance at full synergy.
pub const FULL_SYNERGY_CRIT: Fp = from_pct(10);
/// Matching heroes required for full synergy.
pub const FULL_SYNERGY_HEROES: u8 = 2;
/// Matching turrets required for full synergy.
pub const FULL_SYNERGY_TURRETS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynergyModifiers {
    pub matching_heroes: u8,
    pub matching_turrets: u8,
    pub full: bool,
    pub damage_bonus: Fp,
    pub attack_speed_bonus: Fp,
    pub crit_chance: Fp,
}

impl SynergyModifiers {
    pub fn damage_multiplier(&self) -> Fp {
        ONE + self.damage_bonus
    }
}

/// Synergy from alive heroes and turrets sharing the fortress class.
pub fn resolve_synergy(class: FortressClass, heroes: &[Hero], turrets: &[Turret]) -> SynergyModifiers {
    let matching_heroes = heroes
        .iter()
        .filter(|h| h.is_alive() && h.class() == class)
        .count()
        .min(u8::MAX as usize) as u8;
    let matching_turrets = turrets
        .iter()
        .filter(|t| t.is_alive() && t.class() == class)
        .count()
        .min(u8::MAX as usize) as u8;

    let mut synergy = SynergyModifiers {
        matching_heroes,
        matching_turrets,
        ..Default::default()
    };

    if matching_heroes >= 1 {
        synergy.damage_bonus += HERO_SYNERGY_DAMAGE;
    }
    if matching_turrets >= 1 {
        synergy.damage_bonus += TURRET_SYNERGY_DAMAGE;
        synergy.attack_speed_bonus += TURRET_SYNERGY_ATTACK_SPEED;
    }
    if matching_heroes >= FULL_SYNERGY_HEROES && matching_turrets >= FULL_SYNERGY_TURRETS {
        synergy.full = true;
        synergy.damage_bonus += FULL_SYNERGY_DAMAGE;
        synergy.crit_chance += FULL_SYNERGY_CRIT;
    }

    synergy
}

// ============================================================================
// Pillar
// ============================================================================

/// How often (in ticks) the simulation refreshes pillar modifiers.
pub const PILLAR_REFRESH_TICKS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PillarModifiers {
    pub pillar: Pillar,
    pub enemy_hp_multiplier: Fp,
    pub enemy_speed_multiplier: Fp,
    pub enemy_damage_multiplier: Fp,
    pub favored_class: Option<FortressClass>,
    pub class_damage_bonus: Fp,
}

impl Default for PillarModifiers {
    fn default() -> Self {
        resolve_pillar(Pillar::Streets, 1)
    }
}

/// Modifiers for `pillar` at `wave`. Enemy HP grows 2% per wave into the pillar.
pub fn resolve_pillar(pillar: Pillar, wave: u32) -> PillarModifiers {
    let (hp, speed, damage, favored) = match pillar {
        Pillar::Streets => (ONE, ONE, ONE, None),
        Pillar::Science => (from_pct(110), ONE, from_pct(110), Some(FortressClass::Tech)),
        Pillar::Cosmos => (ONE, from_pct(115), ONE, Some(FortressClass::Lightning)),
        Pillar::Magic => (from_pct(115), ONE, ONE, Some(FortressClass::Ice)),
        Pillar::Gods => (from_pct(125), from_pct(105), from_pct(120), Some(FortressClass::Fire)),
    };
    let depth = (wave.saturating_sub(1) % WAVES_PER_PILLAR) as i32;
    PillarModifiers {
        pillar,
        enemy_hp_multiplier: hp + depth * from_pct(2),
        enemy_speed_multiplier: speed,
        enemy_damage_multiplier: damage,
        favored_class: favored,
        class_damage_bonus: if favored.is_some() { from_pct(20) } else { 0 },
    }
}

// ============================================================================
// Combined Modifiers
// ============================================================================

/// Crit multiplier before `crit_damage_bonus`.
pub const BASE_CRIT_MULTIPLIER: Fp = from_pct(150);
/// Crit chance everyone starts with.
pub const BASE_CRIT_CHANCE: Fp = from_pct(5);
/// Team Spirit bonus per matching alive unit.
pub const TEAM_SPIRIT_PER_UNIT: Fp = from_pct(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub damage_bonus: Fp,
    pub attack_speed_bonus: Fp,
    /// Clamped to `ONE`.
    pub crit_chance: Fp,
    pub crit_damage_bonus: Fp,
    pub max_hp_bonus: Fp,
    /// Clamped to `ONE`.
    pub chain_chance: Fp,
    pub chain_count: u8,
    pub pierce: u8,
    pub splash_radius: Fp,
    pub splash_fraction: Fp,
    pub gold_bonus: Fp,
    pub xp_bonus: Fp,
    /// Targets below this HP fraction take `execute_bonus` extra.
    pub execute_threshold: Fp,
    pub execute_bonus: Fp,
    /// Fortress below this HP fraction deals `low_hp_bonus` extra.
    pub low_hp_threshold: Fp,
    pub low_hp_bonus: Fp,
    pub elite_damage_bonus: Fp,
    pub cooldown_reduction: Fp,
    /// Fortress HP regenerated per regen pulse.
    pub fortress_regen: i32,
}

impl Modifiers {
    pub fn crit_multiplier(&self) -> Fp {
        BASE_CRIT_MULTIPLIER + self.crit_damage_bonus
    }

    /// Scale a cooldown in ticks by attack speed: `interval / (1 + bonus)`, at least 1.
    pub fn scaled_interval(&self, interval: u32) -> u32 {
        let speed = (ONE + self.attack_speed_bonus).max(ONE / 4);
        let scaled = (u64::from(interval) << 16) / speed as u64;
        scaled.max(1) as u32
    }

    /// Scale a skill cooldown by cooldown reduction (never below 25%).
    pub fn scaled_cooldown(&self, cooldown: u32) -> u32 {
        let keep = (ONE - self.cooldown_reduction).max(ONE / 4);
        ((u64::from(cooldown) * keep as u64) >> 16).max(1) as u32
    }
}

/// Everything the combined resolver reads.
#[derive(Debug, Clone, Copy)]
pub struct ModifierInputs<'a> {
    pub class: FortressClass,
    pub heroes: &'a [Hero],
    pub turrets: &'a [Turret],
    pub relics: &'a [RelicKind],
    pub artifacts: &'a [ArtifactKind],
    pub stat_bonuses: StatBonuses,
    pub synergy: &'a SynergyModifiers,
    pub pillar: &'a PillarModifiers,
}

/// Fold every modifier source into one record. Additive throughout; the
/// chance fields are clamped at the end.
pub fn resolve_modifiers(inputs: &ModifierInputs<'_>) -> Modifiers {
    let mut m = Modifiers {
        crit_chance: BASE_CRIT_CHANCE,
        ..Default::default()
    };

    // Fortress class innates.
    match inputs.class {
        FortressClass::Lightning => {
            m.chain_chance += from_pct(15);
            m.chain_count += 2;
        }
        FortressClass::Tech => m.pierce += 1,
        FortressClass::Fire | FortressClass::Ice | FortressClass::Natural => {}
    }

    m.damage_bonus += inputs.stat_bonuses.damage;
    m.max_hp_bonus += inputs.stat_bonuses.max_hp;
    m.gold_bonus += inputs.stat_bonuses.gold;
    m.xp_bonus += inputs.stat_bonuses.xp;

    for artifact in inputs.artifacts {
        match artifact {
            ArtifactKind::WarBanner => m.damage_bonus += from_pct(10),
            ArtifactKind::AegisPlate => m.max_hp_bonus += from_pct(15),
            ArtifactKind::MidasRing => m.gold_bonus += from_pct(10),
            ArtifactKind::ChronoGear => m.attack_speed_bonus += from_pct(10),
            ArtifactKind::SeekersLens => m.crit_chance += from_pct(5),
        }
    }

    for relic in inputs.relics {
        apply_relic(&mut m, *relic, inputs);
    }

    m.damage_bonus += inputs.synergy.damage_bonus;
    m.attack_speed_bonus += inputs.synergy.attack_speed_bonus;
    m.crit_chance += inputs.synergy.crit_chance;

    if inputs.pillar.favored_class == Some(inputs.class) {
        m.damage_bonus += inputs.pillar.class_damage_bonus;
    }

    m.crit_chance = m.crit_chance.clamp(0, ONE);
    m.chain_chance = m.chain_chance.clamp(0, ONE);
    m
}

fn apply_relic(m: &mut Modifiers, relic: RelicKind, inputs: &ModifierInputs<'_>) {
    match relic {
        RelicKind::SharpenedArrows => m.damage_bonus += from_pct(15),
        RelicKind::Quickdraw => m.attack_speed_bonus += from_pct(15),
        RelicKind::LuckyCharm => m.crit_chance += from_pct(10),
        RelicKind::CriticalMass => m.crit_damage_bonus += from_pct(50),
        RelicKind::Executioner => {
            m.execute_threshold = m.execute_threshold.max(from_pct(25));
            m.execute_bonus += from_pct(50);
        }
        RelicKind::Berserker => {
            m.low_hp_threshold = m.low_hp_threshold.max(from_pct(50));
            m.low_hp_bonus += from_pct(40);
        }
        RelicKind::StormCore => {
            m.chain_chance += from_pct(20);
            m.chain_count += 1;
        }
        RelicKind::Piercer => m.pierce += 1,
        RelicKind::Shrapnel => {
            m.splash_radius = m.splash_radius.max(from_int(2));
            m.splash_fraction += from_pct(30);
        }
        RelicKind::EliteHunter => m.elite_damage_bonus += from_pct(40),
        RelicKind::Fortify => m.max_hp_bonus += from_pct(25),
        RelicKind::Goldfinder => m.gold_bonus += from_pct(25),
        RelicKind::Scholar => m.xp_bonus += from_pct(20),
        RelicKind::TeamSpirit => {
            let units = inputs
                .heroes
                .iter()
                .filter(|h| h.is_alive() && h.class() == inputs.class)
                .count()
                + inputs
                    .turrets
                    .iter()
                    .filter(|t| t.is_alive() && t.class() == inputs.class)
                    .count();
            m.damage_bonus += TEAM_SPIRIT_PER_UNIT * units as i32;
        }
        RelicKind::Regrowth => m.fortress_regen += 2,
        RelicKind::Timewarp => m.cooldown_reduction += from_pct(20),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{HeroKind, TurretKind, turret_slot_position};
    use crate::fixed::FpVec2;

    fn hero(id: u32, kind: HeroKind) -> Hero {
        Hero {
            id,
            kind,
            lane: 0,
            pos: FpVec2::ZERO,
            hp: 100,
            max_hp: 100,
            attack_cooldown: 0,
            skill_cooldown: 0,
        }
    }

    fn turret(id: u32, kind: TurretKind) -> Turret {
        let (x, y) = turret_slot_position(id as u8 % 6);
        Turret {
            id,
            kind,
            slot: id as u8,
            pos: FpVec2::new(x, y),
            hp: 100,
            max_hp: 100,
            attack_cooldown: 0,
        }
    }

    #[test]
    fn test_no_synergy_without_matches() {
        let syn = resolve_synergy(
            FortressClass::Fire,
            &[hero(1, HeroKind::Cryomancer)],
            &[turret(1, TurretKind::Cannon)],
        );
        assert_eq!(syn.damage_multiplier(), ONE);
        assert!(!syn.full);
    }

    #[test]
    fn test_partial_synergy_one_hero_one_turret() {
        let syn = resolve_synergy(
            FortressClass::Fire,
            &[hero(1, HeroKind::Pyromancer)],
            &[turret(1, TurretKind::Flamethrower)],
        );
        assert!(!syn.full);
        assert_eq!(
            syn.damage_multiplier(),
            ONE + HERO_SYNERGY_DAMAGE + TURRET_SYNERGY_DAMAGE
        );
        // ~1.45
        assert!((syn.damage_multiplier() - from_pct(145)).abs() <= 1);
        assert_eq!(syn.attack_speed_bonus, TURRET_SYNERGY_ATTACK_SPEED);
    }

    #[test]
    fn test_full_synergy_layers_on_partial() {
        let heroes = [hero(1, HeroKind::Pyromancer), hero(2, HeroKind::Blazeguard)];
        let turrets = [
            turret(1, TurretKind::Cannon),
            turret(2, TurretKind::Ballista),
            turret(3, TurretKind::Cannon),
        ];
        // Tech fortress: Cannon/Ballista match, heroes don't.
        let partial = resolve_synergy(FortressClass::Tech, &heroes, &turrets);
        assert!(!partial.full);

        let tech_heroes = [hero(1, HeroKind::Engineer), hero(2, HeroKind::Engineer)];
        let full = resolve_synergy(FortressClass::Tech, &tech_heroes, &turrets);
        assert!(full.full);
        assert_eq!(full.matching_heroes, 2);
        assert_eq!(full.matching_turrets, 3);
        assert_eq!(
            full.damage_multiplier(),
            ONE + HERO_SYNERGY_DAMAGE + TURRET_SYNERGY_DAMAGE + FULL_SYNERGY_DAMAGE
        );
        assert!((full.damage_multiplier() - from_pct(195)).abs() <= 1);
        assert_eq!(full.crit_chance, FULL_SYNERGY_CRIT);
    }

    #[test]
    fn test_dead_units_do_not_count() {
        let mut h = hero(1, HeroKind::Pyromancer);
        h.hp = 0;
        let syn = resolve_synergy(FortressClass::Fire, &[h], &[]);
        assert_eq!(syn.matching_heroes, 0);
        assert_eq!(syn.damage_bonus, 0);
    }

    fn inputs<'a>(
        class: FortressClass,
        heroes: &'a [Hero],
        turrets: &'a [Turret],
        relics: &'a [RelicKind],
        synergy: &'a SynergyModifiers,
        pillar: &'a PillarModifiers,
    ) -> ModifierInputs<'a> {
        ModifierInputs {
            class,
            heroes,
            turrets,
            relics,
            artifacts: &[],
            stat_bonuses: StatBonuses::default(),
            synergy,
            pillar,
        }
    }

    #[test]
    fn test_team_spirit_scales_per_unit() {
        let heroes = [hero(1, HeroKind::Pyromancer), hero(2, HeroKind::Blazeguard)];
        let turrets = [turret(1, TurretKind::Flamethrower), turret(2, TurretKind::Cannon)];
        let synergy = SynergyModifiers::default();
        let pillar = PillarModifiers::default();
        let relics = [RelicKind::TeamSpirit];
        let m = resolve_modifiers(&inputs(
            FortressClass::Fire,
            &heroes,
            &turrets,
            &relics,
            &synergy,
            &pillar,
        ));
        // Three fire units alive.
        assert_eq!(m.damage_bonus, TEAM_SPIRIT_PER_UNIT * 3);
    }

    #[test]
    fn test_chances_clamped() {
        let synergy = SynergyModifiers {
            crit_chance: ONE * 2,
            ..Default::default()
        };
        let pillar = PillarModifiers::default();
        let relics = [RelicKind::StormCore, RelicKind::LuckyCharm];
        let m = resolve_modifiers(&inputs(
            FortressClass::Lightning,
            &[],
            &[],
            &relics,
            &synergy,
            &pillar,
        ));
        assert_eq!(m.crit_chance, ONE);
        assert_eq!(m.chain_chance, from_pct(15) + from_pct(20));
        assert_eq!(m.chain_count, 3);
    }

    #[test]
    fn test_pillar_favored_class_bonus() {
        let synergy = SynergyModifiers::default();
        let pillar = resolve_pillar(Pillar::Science, 11);
        let m = resolve_modifiers(&inputs(FortressClass::Tech, &[], &[], &[], &synergy, &pillar));
        assert_eq!(m.damage_bonus, from_pct(20));
        assert_eq!(m.pierce, 1);
    }

    #[test]
    fn test_pillar_depth_scaling() {
        let first = resolve_pillar(Pillar::Streets, 1);
        let last = resolve_pillar(Pillar::Streets, 10);
        assert_eq!(first.enemy_hp_multiplier, ONE);
        assert_eq!(last.enemy_hp_multiplier, ONE + 9 * from_pct(2));
    }

    #[test]
    fn test_scaled_interval() {
        let m = Modifiers {
            attack_speed_bonus: ONE,
            ..Default::default()
        };
        assert_eq!(m.scaled_interval(20), 10);
        assert_eq!(Modifiers::default().scaled_interval(20), 20);
        assert_eq!(m.scaled_interval(1), 1);
    }
}
