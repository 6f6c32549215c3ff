//! Game state and entity types.
//!
//! `GameState` is the single mutable aggregate advanced by the simulation.
//! Entity collections are `Vec`s kept in ascending id order (ids come from
//! per-collection counters that only ever increase), so iteration order is
//! deterministic and doubles as the targeting tie-break.

use std::collections::{BTreeMap, VecDeque};

use crate::Tick;
use crate::content::{
    ArtifactKind, EnemyKind, FortressClass, HeroKind, MaterialKind, Pillar, RelicKind, StatusKind,
    TurretKind,
};
use crate::fixed::{Fp, FpVec2, ONE};
use crate::modifiers::{Modifiers, PillarModifiers, SynergyModifiers};

/// Identifier of an entity within its collection. Never reused in a session.
pub type EntityId = u32;

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Won,
    Lost,
}

impl Phase {
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub const fn is_ended(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

// ============================================================================
// Status Effects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub remaining: u32,
    pub magnitude: Fp,
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enemy {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub elite: bool,
    pub hp: i32,
    pub max_hp: i32,
    /// Absorbs damage before HP; granted by shield auras.
    pub shield: i32,
    pub pos: FpVec2,
    pub vel: FpVec2,
    pub lane: u8,
    pub target_lane: u8,
    /// Units per tick before slows.
    pub speed: Fp,
    pub damage: i32,
    pub attack_cooldown: u32,
    /// Stopped and attacking something.
    pub engaged: bool,
    pub statuses: Vec<StatusEffect>,
}

impl Enemy {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn has_status(&self, kind: StatusKind) -> bool {
        self.statuses.iter().any(|s| s.kind == kind)
    }

    /// Multiplier on movement from slows and freezes.
    pub fn speed_factor(&self) -> Fp {
        if self.has_status(StatusKind::Freeze) {
            return 0;
        }
        let slow = self
            .statuses
            .iter()
            .filter(|s| s.kind == StatusKind::Slow)
            .map(|s| s.magnitude)
            .max()
            .unwrap_or(0);
        (ONE - slow).max(ONE / 5)
    }

    /// Apply or refresh a status; the stronger magnitude and longer duration win.
    pub fn apply_status(&mut self, kind: StatusKind, duration: u32, magnitude: Fp) {
        if let Some(existing) = self.statuses.iter_mut().find(|s| s.kind == kind) {
            existing.remaining = existing.remaining.max(duration);
            existing.magnitude = existing.magnitude.max(magnitude);
        } else {
            self.statuses.push(StatusEffect {
                kind,
                remaining: duration,
                magnitude,
            });
        }
    }

    /// HP fraction in Q16.16.
    pub fn hp_fraction(&self) -> Fp {
        crate::fixed::from_ratio(self.hp.max(0), self.max_hp.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hero {
    pub id: EntityId,
    pub kind: HeroKind,
    pub lane: u8,
    pub pos: FpVec2,
    pub hp: i32,
    pub max_hp: i32,
    pub attack_cooldown: u32,
    pub skill_cooldown: u32,
}

impl Hero {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn class(&self) -> FortressClass {
        self.kind.stats().class
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turret {
    pub id: EntityId,
    pub kind: TurretKind,
    pub slot: u8,
    pub pos: FpVec2,
    pub hp: i32,
    pub max_hp: i32,
    pub attack_cooldown: u32,
}

impl Turret {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn class(&self) -> FortressClass {
        self.kind.stats().class
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileSource {
    Fortress,
    Turret(EntityId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projectile {
    pub id: EntityId,
    pub source: ProjectileSource,
    pub class: FortressClass,
    pub target: EntityId,
    pub pos: FpVec2,
    pub speed: Fp,
    pub base_damage: Fp,
    pub pierce_left: u8,
    /// Enemies already struck (pierce never hits the same enemy twice).
    pub hit: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wall {
    pub id: EntityId,
    pub lane: u8,
    pub x: Fp,
    pub hp: i32,
    pub max_hp: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Militia {
    pub id: EntityId,
    pub lane: u8,
    pub pos: FpVec2,
    pub hp: i32,
    pub damage: i32,
    pub attack_cooldown: u32,
    pub remaining: u32,
}

// ============================================================================
// Ability Side-Table
// ============================================================================

/// Cooldown state for an enemy's special ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbilityState {
    pub cooldown: u32,
    pub uses: u32,
}

/// Enemy ability state keyed by enemy id.
///
/// This is a back-reference: the table never owns an enemy. Entries for
/// dead enemies are dropped by `retain_live` every tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbilityTable {
    entries: BTreeMap<EntityId, AbilityState>,
}

impl AbilityTable {
    pub fn get(&self, id: EntityId) -> Option<&AbilityState> {
        self.entries.get(&id)
    }

    /// State for `id`, inserting a fresh entry with `initial_cooldown`.
    pub fn entry(&mut self, id: EntityId, initial_cooldown: u32) -> &mut AbilityState {
        self.entries.entry(id).or_insert(AbilityState {
            cooldown: initial_cooldown,
            uses: 0,
        })
    }

    /// Drop entries whose id is not in `live` (sorted ascending).
    pub fn retain_live(&mut self, live: &[EntityId]) {
        self.entries.retain(|id, _| live.binary_search(id).is_ok());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &AbilityState)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Waves & Choices
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnEntry {
    pub kind: EnemyKind,
    pub elite: bool,
    pub lane: u8,
    /// Ticks to wait after the previous spawn.
    pub delay: u32,
}

/// Open relic choice window; gameplay is paused while this exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelicChoice {
    pub options: Vec<RelicKind>,
    pub rerolls: u32,
}

// ============================================================================
// Id Counters
// ============================================================================

/// Per-collection id counters. Ids start at 1 and only increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCounters {
    pub enemy: EntityId,
    pub hero: EntityId,
    pub turret: EntityId,
    pub projectile: EntityId,
    pub wall: EntityId,
    pub militia: EntityId,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            enemy: 1,
            hero: 1,
            turret: 1,
            projectile: 1,
            wall: 1,
            militia: 1,
        }
    }
}

fn take_id(counter: &mut EntityId) -> EntityId {
    let id = *counter;
    *counter = counter.wrapping_add(1);
    id
}

impl IdCounters {
    pub fn next_enemy(&mut self) -> EntityId {
        take_id(&mut self.enemy)
    }

    pub fn next_hero(&mut self) -> EntityId {
        take_id(&mut self.hero)
    }

    pub fn next_turret(&mut self) -> EntityId {
        take_id(&mut self.turret)
    }

    pub fn next_projectile(&mut self) -> EntityId {
        take_id(&mut self.projectile)
    }

    pub fn next_wall(&mut self) -> EntityId {
        take_id(&mut self.wall)
    }

    pub fn next_militia(&mut self) -> EntityId {
        take_id(&mut self.militia)
    }
}

// ============================================================================
// Counters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub kills: u32,
    pub elite_kills: u32,
    pub boss_kills: u32,
    pub retries: u32,
    pub waves_cleared: u32,
}

// ============================================================================
// GameState
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub tick: Tick,
    /// Most recently started wave.
    pub wave: u32,
    pub phase: Phase,
    pub rng_state: u32,

    pub fortress_class: FortressClass,
    pub fortress_hp: i32,
    pub fortress_max_hp: i32,
    pub fortress_attack_cooldown: u32,

    pub enemies: Vec<Enemy>,
    pub heroes: Vec<Hero>,
    pub turrets: Vec<Turret>,
    pub projectiles: Vec<Projectile>,
    pub walls: Vec<Wall>,
    pub militia: Vec<Militia>,
    pub ids: IdCounters,
    pub abilities: AbilityTable,

    pub relics: Vec<RelicKind>,
    pub pillar: Pillar,
    pub modifiers: Modifiers,
    pub synergy_modifiers: SynergyModifiers,
    pub pillar_modifiers: PillarModifiers,

    pub wave_active: bool,
    pub spawn_queue: VecDeque<SpawnEntry>,
    pub spawn_cooldown: u32,
    /// Ticks until the next wave starts (while no wave is active).
    pub wave_countdown: u32,
    pub relic_choice: Option<RelicChoice>,

    /// Spendable in-session gold (walls, militia, rerolls).
    pub wallet_gold: u32,
    pub segment_gold_earned: u64,
    pub segment_dust_earned: u64,
    pub segment_xp_earned: u64,
    pub segment_materials_earned: BTreeMap<MaterialKind, u32>,
    pub segment_artifacts_earned: Vec<ArtifactKind>,
    pub stats: SessionStats,
}

impl GameState {
    /// Last fully cleared wave.
    pub fn cleared_wave(&self) -> u32 {
        if self.wave_active {
            self.wave.saturating_sub(1)
        } else {
            self.wave
        }
    }

    pub fn is_ended(&self) -> bool {
        self.phase.is_ended()
    }

    pub fn is_paused(&self) -> bool {
        self.relic_choice.is_some()
    }

    pub fn enemy(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| &self.enemies[idx])
    }

    pub fn enemy_index(&self, id: EntityId) -> Option<usize> {
        self.enemies.binary_search_by_key(&id, |e| e.id).ok()
    }

    pub fn live_enemy_ids(&self) -> Vec<EntityId> {
        self.enemies
            .iter()
            .filter(|e| e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    pub fn fortress_hp_fraction(&self) -> Fp {
        crate::fixed::from_ratio(self.fortress_hp.max(0), self.fortress_max_hp.max(1))
    }

    pub fn alive_hero_in_lane(&self, lane: u8) -> Option<usize> {
        self.heroes
            .iter()
            .position(|h| h.lane == lane && h.is_alive())
    }

    pub fn add_material(&mut self, material: MaterialKind, amount: u32) {
        *self.segment_materials_earned.entry(material).or_insert(0) += amount;
    }

    /// Credit gold to both the wallet and the segment accumulator.
    pub fn earn_gold(&mut self, base: u32) {
        let scaled = scale_reward(base, self.modifiers.gold_bonus);
        self.wallet_gold = self.wallet_gold.saturating_add(scaled);
        self.segment_gold_earned = self.segment_gold_earned.saturating_add(u64::from(scaled));
    }

    pub fn earn_xp(&mut self, base: u32) {
        let scaled = scale_reward(base, self.modifiers.xp_bonus);
        self.segment_xp_earned = self.segment_xp_earned.saturating_add(u64::from(scaled));
    }
}

/// `floor(base * (1 + bonus))`, never below zero.
pub fn scale_reward(base: u32, bonus: Fp) -> u32 {
    let factor = ONE.saturating_add(bonus).max(0) as u64;
    ((u64::from(base) * factor) >> 16).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::from_pct;

    #[test]
    fn test_ability_table_prunes_dead() {
        let mut table = AbilityTable::default();
        table.entry(1, 10);
        table.entry(2, 10);
        table.entry(5, 10);
        table.retain_live(&[2, 5]);
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_id_counters_monotonic() {
        let mut ids = IdCounters::default();
        let a = ids.next_enemy();
        let b = ids.next_enemy();
        assert_eq!(a, 1);
        assert!(b > a);
        assert_eq!(ids.next_wall(), 1);
    }

    #[test]
    fn test_scale_reward() {
        assert_eq!(scale_reward(100, 0), 100);
        assert_eq!(scale_reward(100, ONE), 200);
        assert_eq!(scale_reward(100, from_pct(50)), 150);
        assert_eq!(scale_reward(7, -ONE * 2), 0);
    }

    #[test]
    fn test_status_refresh_keeps_strongest() {
        let mut enemy = Enemy {
            id: 1,
            kind: EnemyKind::Grunt,
            elite: false,
            hp: 10,
            max_hp: 10,
            shield: 0,
            pos: FpVec2::ZERO,
            vel: FpVec2::ZERO,
            lane: 0,
            target_lane: 0,
            speed: ONE,
            damage: 1,
            attack_cooldown: 0,
            engaged: false,
            statuses: Vec::new(),
        };
        enemy.apply_status(StatusKind::Slow, 30, from_pct(20));
        enemy.apply_status(StatusKind::Slow, 10, from_pct(50));
        assert_eq!(enemy.statuses.len(), 1);
        assert_eq!(enemy.statuses[0].remaining, 30);
        assert_eq!(enemy.statuses[0].magnitude, from_pct(50));
        assert_eq!(enemy.speed_factor(), ONE - from_pct(50));

        enemy.apply_status(StatusKind::Freeze, 5, ONE);
        assert_eq!(enemy.speed_factor(), 0);
    }
}
