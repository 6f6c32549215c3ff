//! Targeting, the damage formula, and hit resolution.
//!
//! The damage formula multiplies its factors one at a time with fixed-point
//! `mul`, in a fixed order. Each intermediate is truncated, so the order is
//! part of the replay contract and must not change.

use crate::content::{FIELD_END_X, FortressClass, STATUS_PULSE_TICKS, StatusKind};
use crate::fixed::{Fp, FpVec2, ONE, from_int, mul, to_int};
use crate::rng::Xorshift32;
use crate::state::{Enemy, EntityId, GameState};

// ============================================================================
// Targeting
// ============================================================================

/// Bonus when the expected hit would finish the target.
pub const FINISH_BONUS: Fp = from_int(6);
/// Bonus for elite enemies.
pub const ELITE_PRIORITY_BONUS: Fp = from_int(3);

/// Priority score: proximity to the fortress, finish bonus, type danger and
/// elite flag, summed.
pub fn priority_score(enemy: &Enemy, expected_hit: i32) -> Fp {
    let proximity = FIELD_END_X - enemy.pos.x;
    let finish = if enemy.hp + enemy.shield <= expected_hit {
        FINISH_BONUS
    } else {
        0
    };
    let elite = if enemy.elite { ELITE_PRIORITY_BONUS } else { 0 };
    proximity + finish + enemy.kind.stats().danger + elite
}

/// Highest-priority live enemy within `range` of `origin`.
///
/// Candidates are visited in ascending id order and only a strictly higher
/// score replaces the current best, so ties go to the lowest id.
pub fn pick_target(
    enemies: &[Enemy],
    origin: FpVec2,
    range: Fp,
    expected_hit: i32,
    exclude: &[EntityId],
) -> Option<EntityId> {
    let range_sq = mul(range, range);
    let mut best: Option<(EntityId, Fp)> = None;
    for enemy in enemies {
        if !enemy.is_alive() || exclude.contains(&enemy.id) {
            continue;
        }
        if enemy.pos.dist_sq(origin) > range_sq {
            continue;
        }
        let score = priority_score(enemy, expected_hit);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((enemy.id, score));
        }
    }
    best.map(|(id, _)| id)
}

/// Nearest live enemy within `range` of `origin`, lowest id on ties.
pub fn nearest_enemy(
    enemies: &[Enemy],
    origin: FpVec2,
    range: Fp,
    exclude: &[EntityId],
) -> Option<EntityId> {
    let range_sq = mul(range, range);
    let mut best: Option<(EntityId, Fp)> = None;
    for enemy in enemies {
        if !enemy.is_alive() || exclude.contains(&enemy.id) {
            continue;
        }
        let d = enemy.pos.dist_sq(origin);
        if d <= range_sq && best.is_none_or(|(_, bd)| d < bd) {
            best = Some((enemy.id, d));
        }
    }
    best.map(|(id, _)| id)
}

// ============================================================================
// Damage Formula
// ============================================================================

/// Damage grows 3% per wave after the first, up to 50x.
pub fn wave_scaling(wave: u32) -> Fp {
    let steps = wave.saturating_sub(1).min(1_700) as i32;
    (ONE + steps * crate::fixed::from_pct(3)).min(from_int(50))
}

/// Multipliers of one hit, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageFactors {
    pub base: Fp,
    pub damage_bonus: Fp,
    pub wave_scaling: Fp,
    pub elite_bonus: Fp,
    pub execute_bonus: Fp,
    pub low_hp_bonus: Fp,
    pub crit_bonus: Fp,
}

impl DamageFactors {
    /// `floor(base × (1+damage_bonus) × wave × elite × execute × low_hp × crit)`,
    /// multiplied left to right, at least 1.
    ///
    /// Each product saturates at the largest Q16.16 value, so a hit never
    /// deals more than 32767.
    pub fn compute(&self) -> i32 {
        let mut v = self.base;
        v = mul_saturating(v, ONE + self.damage_bonus);
        v = mul_saturating(v, self.wave_scaling);
        v = mul_saturating(v, self.elite_bonus);
        v = mul_saturating(v, self.execute_bonus);
        v = mul_saturating(v, self.low_hp_bonus);
        v = mul_saturating(v, self.crit_bonus);
        to_int(v).max(1)
    }
}

/// `mul` clamped to the `Fp` range instead of wrapping.
fn mul_saturating(a: Fp, b: Fp) -> Fp {
    let wide = (i64::from(a) * i64::from(b)) >> 16;
    wide.clamp(i64::from(Fp::MIN), i64::from(Fp::MAX)) as Fp
}

/// Build the factors for a hit on `target`. Rolls crit when `can_crit`;
/// that roll is the only RNG draw here.
pub fn damage_factors(
    state: &GameState,
    rng: &mut Xorshift32,
    target: &Enemy,
    base: Fp,
    can_crit: bool,
) -> DamageFactors {
    let m = &state.modifiers;
    let elite_bonus = if target.elite || target.kind.is_boss() {
        ONE + m.elite_damage_bonus
    } else {
        ONE
    };
    let execute_bonus = if m.execute_bonus > 0 && target.hp_fraction() < m.execute_threshold {
        ONE + m.execute_bonus
    } else {
        ONE
    };
    let low_hp_bonus =
        if m.low_hp_bonus > 0 && state.fortress_hp_fraction() < m.low_hp_threshold {
            ONE + m.low_hp_bonus
        } else {
            ONE
        };
    let crit_bonus = if can_crit && rng.chance(m.crit_chance) {
        m.crit_multiplier()
    } else {
        ONE
    };
    DamageFactors {
        base,
        damage_bonus: m.damage_bonus,
        wave_scaling: wave_scaling(state.wave),
        elite_bonus,
        execute_bonus,
        low_hp_bonus,
        crit_bonus,
    }
}

/// Shields absorb first. Returns HP actually removed.
pub fn apply_damage(enemy: &mut Enemy, damage: i32) -> i32 {
    if !enemy.is_alive() || damage <= 0 {
        return 0;
    }
    let absorbed = enemy.shield.min(damage);
    enemy.shield -= absorbed;
    let through = (damage - absorbed).min(enemy.hp);
    enemy.hp -= through;
    through
}

// ============================================================================
// Hit Resolution
// ============================================================================

/// Chained hits jump at most this far.
pub const CHAIN_RANGE: Fp = from_int(5);

/// A single attack landing on an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub target: EntityId,
    pub base: Fp,
    pub class: FortressClass,
    pub can_crit: bool,
}

/// Resolve a hit: primary damage with crit, class status, splash, then
/// chain. Returns the primary damage dealt (0 if the target is gone).
pub fn resolve_hit(state: &mut GameState, rng: &mut Xorshift32, hit: Hit) -> i32 {
    let Some(idx) = state.enemy_index(hit.target) else {
        return 0;
    };
    if !state.enemies[idx].is_alive() {
        return 0;
    }

    let factors = damage_factors(state, rng, &state.enemies[idx], hit.base, hit.can_crit);
    let damage = factors.compute();
    let center = state.enemies[idx].pos;
    apply_damage(&mut state.enemies[idx], damage);
    apply_class_status(&mut state.enemies[idx], hit.class, damage);

    let m = state.modifiers;
    if m.splash_fraction > 0 && m.splash_radius > 0 {
        let splash = to_int(mul(from_int(damage), m.splash_fraction)).max(1);
        let radius_sq = mul(m.splash_radius, m.splash_radius);
        for other in state.enemies.iter_mut() {
            if other.id != hit.target && other.is_alive() && other.pos.dist_sq(center) <= radius_sq
            {
                apply_damage(other, splash);
            }
        }
    }

    if m.chain_count > 0 && rng.chance(m.chain_chance) {
        let mut struck = vec![hit.target];
        let mut from = center;
        let mut chain_damage = damage;
        for _ in 0..m.chain_count {
            chain_damage = (chain_damage / 2).max(1);
            let Some(next) = nearest_enemy(&state.enemies, from, CHAIN_RANGE, &struck) else {
                break;
            };
            let Some(next_idx) = state.enemy_index(next) else {
                break;
            };
            let target = &mut state.enemies[next_idx];
            apply_damage(target, chain_damage);
            from = target.pos;
            struck.push(next);
        }
    }

    damage
}

/// Apply the status effect for an attacking class, if it has one.
pub fn apply_class_status(enemy: &mut Enemy, class: FortressClass, damage: i32) {
    if !enemy.is_alive() {
        return;
    }
    if let Some(kind) = class.on_hit_status() {
        let (duration, magnitude) = kind.default_application(damage);
        enemy.apply_status(kind, duration, magnitude);
    }
}

/// Advance status timers and pulse damage-over-time. DoT bypasses shields.
pub fn tick_statuses(state: &mut GameState) {
    for enemy in state.enemies.iter_mut() {
        if !enemy.is_alive() {
            continue;
        }
        let mut dot = 0;
        for status in enemy.statuses.iter_mut() {
            status.remaining = status.remaining.saturating_sub(1);
            let pulses = matches!(status.kind, StatusKind::Burn | StatusKind::Poison);
            if pulses && status.remaining % STATUS_PULSE_TICKS == 0 {
                dot += to_int(status.magnitude).max(1);
            }
        }
        enemy.hp = (enemy.hp - dot).max(0);
        enemy.statuses.retain(|s| s.remaining > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EnemyKind;
    use crate::fixed::from_pct;

    fn enemy(id: EntityId, kind: EnemyKind, x: i32, hp: i32) -> Enemy {
        Enemy {
            id,
            kind,
            elite: false,
            hp,
            max_hp: hp,
            shield: 0,
            pos: FpVec2::new(from_int(x), from_int(2)),
            vel: FpVec2::ZERO,
            lane: 0,
            target_lane: 0,
            speed: ONE,
            damage: 1,
            attack_cooldown: 0,
            engaged: false,
            statuses: Vec::new(),
        }
    }

    #[test]
    fn test_tie_break_lowest_id() {
        let enemies = vec![
            enemy(3, EnemyKind::Grunt, 20, 30),
            enemy(7, EnemyKind::Grunt, 20, 30),
        ];
        let origin = FpVec2::new(from_int(2), from_int(2));
        assert_eq!(pick_target(&enemies, origin, from_int(40), 1, &[]), Some(3));
    }

    #[test]
    fn test_priority_prefers_closer_and_dangerous() {
        let enemies = vec![
            enemy(1, EnemyKind::Grunt, 30, 30),
            enemy(2, EnemyKind::Grunt, 10, 30),
        ];
        let origin = FpVec2::new(from_int(2), from_int(2));
        assert_eq!(pick_target(&enemies, origin, from_int(40), 1, &[]), Some(2));

        // Same distance: the Runner's higher danger wins.
        let enemies = vec![
            enemy(1, EnemyKind::Grunt, 20, 30),
            enemy(2, EnemyKind::Runner, 20, 18),
        ];
        assert_eq!(pick_target(&enemies, origin, from_int(40), 1, &[]), Some(2));
    }

    #[test]
    fn test_finish_bonus() {
        let low = enemy(1, EnemyKind::Grunt, 20, 5);
        let full = enemy(2, EnemyKind::Grunt, 20, 30);
        assert_eq!(
            priority_score(&low, 10) - priority_score(&full, 10),
            FINISH_BONUS
        );
    }

    #[test]
    fn test_out_of_range_skipped() {
        let enemies = vec![enemy(1, EnemyKind::Grunt, 30, 30)];
        let origin = FpVec2::new(from_int(2), from_int(2));
        assert_eq!(pick_target(&enemies, origin, from_int(10), 1, &[]), None);
    }

    #[test]
    fn test_damage_formula_order_matters() {
        let factors = DamageFactors {
            base: from_int(10),
            damage_bonus: from_pct(33),
            wave_scaling: from_pct(106),
            elite_bonus: ONE,
            execute_bonus: ONE,
            low_hp_bonus: ONE,
            crit_bonus: from_pct(150),
        };
        let mut expected = from_int(10);
        for f in [ONE + from_pct(33), from_pct(106), ONE, ONE, ONE, from_pct(150)] {
            expected = mul(expected, f);
        }
        assert_eq!(factors.compute(), to_int(expected));
        assert_eq!(factors.compute(), 21);
    }

    #[test]
    fn test_damage_at_least_one() {
        let factors = DamageFactors {
            base: ONE / 10,
            damage_bonus: 0,
            wave_scaling: ONE,
            elite_bonus: ONE,
            execute_bonus: ONE,
            low_hp_bonus: ONE,
            crit_bonus: ONE,
        };
        assert_eq!(factors.compute(), 1);
    }

    #[test]
    fn test_shield_absorbs_first() {
        let mut e = enemy(1, EnemyKind::Warden, 20, 50);
        e.shield = 10;
        assert_eq!(apply_damage(&mut e, 15), 5);
        assert_eq!(e.shield, 0);
        assert_eq!(e.hp, 45);
        assert_eq!(apply_damage(&mut e, 100), 45);
        assert!(!e.is_alive());
    }

    #[test]
    fn test_wave_scaling() {
        assert_eq!(wave_scaling(0), ONE);
        assert_eq!(wave_scaling(1), ONE);
        assert_eq!(wave_scaling(11), ONE + 10 * from_pct(3));
        assert_eq!(wave_scaling(1_700), from_int(50));
        assert_eq!(wave_scaling(u32::MAX), from_int(50));
    }

    #[test]
    fn test_deep_wave_damage_saturates() {
        let factors = DamageFactors {
            base: from_int(1_000),
            damage_bonus: ONE,
            wave_scaling: from_int(50),
            elite_bonus: ONE,
            execute_bonus: ONE,
            low_hp_bonus: ONE,
            crit_bonus: from_int(2),
        };
        assert_eq!(factors.compute(), i32::MAX >> 16);
    }

    fn hit_state(enemies: Vec<Enemy>) -> GameState {
        let mut state = crate::simulation::Simulation::new(1, Default::default())
            .map(|sim| sim.state().clone())
            .unwrap();
        state.enemies = enemies;
        state
    }

    fn hit(target: EntityId) -> Hit {
        Hit {
            target,
            base: from_int(20),
            class: FortressClass::Tech,
            can_crit: false,
        }
    }

    #[test]
    fn test_splash_hits_neighbours_in_radius() {
        let mut state = hit_state(vec![
            enemy(1, EnemyKind::Grunt, 20, 1_000),
            enemy(2, EnemyKind::Grunt, 21, 1_000),
            enemy(3, EnemyKind::Grunt, 30, 1_000),
        ]);
        state.modifiers.splash_radius = from_int(2);
        state.modifiers.splash_fraction = from_pct(50);
        state.modifiers.chain_count = 0;

        let damage = resolve_hit(&mut state, &mut Xorshift32::new(9), hit(1));
        assert!(damage > 1);
        assert_eq!(state.enemies[0].hp, 1_000 - damage);
        assert_eq!(state.enemies[1].hp, 1_000 - damage / 2);
        assert_eq!(state.enemies[2].hp, 1_000);
    }

    #[test]
    fn test_chain_halves_per_jump() {
        let mut state = hit_state(vec![
            enemy(1, EnemyKind::Grunt, 20, 1_000),
            enemy(2, EnemyKind::Grunt, 21, 1_000),
            enemy(3, EnemyKind::Grunt, 24, 1_000),
            enemy(4, EnemyKind::Grunt, 35, 1_000),
        ]);
        state.modifiers.splash_radius = 0;
        state.modifiers.splash_fraction = 0;
        state.modifiers.chain_chance = ONE;
        state.modifiers.chain_count = 3;

        let damage = resolve_hit(&mut state, &mut Xorshift32::new(9), hit(1));
        assert!(damage > 3);
        assert_eq!(state.enemies[0].hp, 1_000 - damage);
        assert_eq!(state.enemies[1].hp, 1_000 - damage / 2);
        assert_eq!(state.enemies[2].hp, 1_000 - damage / 2 / 2);
        // Out of chain range of the last link.
        assert_eq!(state.enemies[3].hp, 1_000);
    }

    #[test]
    fn test_hit_on_missing_target_is_void() {
        let mut state = hit_state(vec![enemy(1, EnemyKind::Grunt, 20, 1_000)]);
        assert_eq!(resolve_hit(&mut state, &mut Xorshift32::new(1), hit(99)), 0);
        assert_eq!(state.enemies[0].hp, 1_000);
    }
}
