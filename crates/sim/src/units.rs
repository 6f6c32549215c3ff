//! Player-side units: heroes, turrets, the fortress itself, walls and
//! militia, plus hero skills.

use crate::combat::{self, Hit, apply_class_status, apply_damage, pick_target};
use crate::content::{
    FIELD_END_X, FORTRESS_X, FortressClass, LANE_COUNT, MILITIA_DAMAGE, MILITIA_HP,
    MILITIA_LIFETIME, MILITIA_SQUAD_SIZE, SkillKind, StatusKind, WALL_HP, lane_y,
};
use crate::fixed::{Fp, FpVec2, ONE, from_int, from_pct, mul, to_int};
use crate::rng::Xorshift32;
use crate::state::{EntityId, GameState, Militia, Projectile, ProjectileSource, Wall};

/// Fortress projectiles fly at one unit per tick.
pub const FORTRESS_PROJECTILE_SPEED: Fp = ONE;
/// Fortress regeneration pulses on this cadence.
pub const REGEN_PULSE_TICKS: u64 = 30;
pub const MILITIA_RANGE: Fp = from_int(2);
pub const MILITIA_ATTACK_INTERVAL: u32 = 20;
/// Militia hold the line this far out.
pub const MILITIA_X: Fp = from_int(9);

// ============================================================================
// Heroes
// ============================================================================

/// Heroes attack hitscan: damage lands the tick they fire.
pub fn update_heroes(state: &mut GameState, rng: &mut Xorshift32) {
    for i in 0..state.heroes.len() {
        let hero = &mut state.heroes[i];
        hero.skill_cooldown = hero.skill_cooldown.saturating_sub(1);
        if !hero.is_alive() {
            continue;
        }
        hero.attack_cooldown = hero.attack_cooldown.saturating_sub(1);
        if hero.attack_cooldown > 0 {
            continue;
        }
        let stats = hero.kind.stats();
        let origin = hero.pos;
        let expected = to_int(stats.damage);
        let Some(target) = pick_target(&state.enemies, origin, stats.range, expected, &[]) else {
            continue;
        };
        combat::resolve_hit(
            state,
            rng,
            Hit {
                target,
                base: stats.damage,
                class: stats.class,
                can_crit: true,
            },
        );
        state.heroes[i].attack_cooldown = state.modifiers.scaled_interval(stats.attack_interval);
    }
}

/// Fire a hero's skill. Returns false (and does nothing) when the hero is
/// missing, dead or still on cooldown.
pub fn activate_skill(state: &mut GameState, rng: &mut Xorshift32, hero_id: EntityId) -> bool {
    let Some(i) = state.heroes.iter().position(|h| h.id == hero_id) else {
        return false;
    };
    let hero = &state.heroes[i];
    if !hero.is_alive() || hero.skill_cooldown > 0 {
        return false;
    }
    let stats = hero.kind.stats();
    match stats.skill {
        SkillKind::Inferno => {
            area_skill(state, rng, stats.damage * 3, from_int(3), stats.class, None);
        }
        SkillKind::Blizzard => {
            area_skill(state, rng, stats.damage, from_int(4), stats.class, Some(StatusKind::Freeze));
        }
        SkillKind::Thunderstrike => {
            let mut struck = Vec::new();
            for _ in 0..3 {
                let Some(target) = pick_target(&state.enemies, FpVec2::ZERO, FIELD_END_X * 2, 0, &struck)
                else {
                    break;
                };
                combat::resolve_hit(
                    state,
                    rng,
                    Hit {
                        target,
                        base: stats.damage * 5 / 2,
                        class: stats.class,
                        can_crit: true,
                    },
                );
                struck.push(target);
            }
        }
        SkillKind::Rejuvenate => {
            let heal = to_int(mul(from_int(state.fortress_max_hp), from_pct(15)));
            state.fortress_hp = (state.fortress_hp + heal).min(state.fortress_max_hp);
        }
        SkillKind::Overclock => {
            let target = state
                .enemies
                .iter()
                .filter(|e| e.is_alive())
                .max_by_key(|e| (e.hp, std::cmp::Reverse(e.id)))
                .map(|e| e.id);
            if let Some(target) = target {
                combat::resolve_hit(
                    state,
                    rng,
                    Hit {
                        target,
                        base: stats.damage * 5,
                        class: stats.class,
                        can_crit: false,
                    },
                );
            }
        }
    }
    state.heroes[i].skill_cooldown = state.modifiers.scaled_cooldown(stats.skill_cooldown);
    true
}

/// Hit everything within `radius` of the top-priority enemy.
fn area_skill(
    state: &mut GameState,
    rng: &mut Xorshift32,
    base: Fp,
    radius: Fp,
    class: FortressClass,
    status: Option<StatusKind>,
) {
    let Some(center_id) = pick_target(&state.enemies, FpVec2::ZERO, FIELD_END_X * 2, 0, &[]) else {
        return;
    };
    let Some(center) = state.enemy(center_id).map(|e| e.pos) else {
        return;
    };
    let radius_sq = mul(radius, radius);
    let targets: Vec<EntityId> = state
        .enemies
        .iter()
        .filter(|e| e.is_alive() && e.pos.dist_sq(center) <= radius_sq)
        .map(|e| e.id)
        .collect();
    for target in targets {
        let Some(idx) = state.enemy_index(target) else {
            continue;
        };
        let factors = combat::damage_factors(state, rng, &state.enemies[idx], base, false);
        let damage = factors.compute();
        let enemy = &mut state.enemies[idx];
        apply_damage(enemy, damage);
        apply_class_status(enemy, class, damage);
        if let Some(kind) = status {
            let (duration, magnitude) = kind.default_application(damage);
            enemy.apply_status(kind, duration, magnitude);
        }
    }
}

// ============================================================================
// Turrets & Fortress
// ============================================================================

/// Turrets launch homing projectiles at their best target in range.
pub fn update_turrets(state: &mut GameState) {
    for i in 0..state.turrets.len() {
        let turret = &mut state.turrets[i];
        if !turret.is_alive() {
            continue;
        }
        turret.attack_cooldown = turret.attack_cooldown.saturating_sub(1);
        if turret.attack_cooldown > 0 {
            continue;
        }
        let stats = turret.kind.stats();
        let (turret_id, origin) = (turret.id, turret.pos);
        let Some(target) =
            pick_target(&state.enemies, origin, stats.range, to_int(stats.damage), &[])
        else {
            continue;
        };
        let id = state.ids.next_projectile();
        state.projectiles.push(Projectile {
            id,
            source: ProjectileSource::Turret(turret_id),
            class: stats.class,
            target,
            pos: origin,
            speed: stats.projectile_speed,
            base_damage: stats.damage,
            pierce_left: state.modifiers.pierce,
            hit: Vec::new(),
        });
        state.turrets[i].attack_cooldown = state.modifiers.scaled_interval(stats.attack_interval);
    }
}

/// The fortress fires at the highest-priority enemy anywhere on the field.
pub fn fortress_attack(state: &mut GameState, base_damage: Fp, interval: u32) {
    state.fortress_attack_cooldown = state.fortress_attack_cooldown.saturating_sub(1);
    if state.fortress_attack_cooldown > 0 {
        return;
    }
    let origin = FpVec2::new(FORTRESS_X, lane_y(LANE_COUNT / 2));
    let Some(target) = pick_target(&state.enemies, origin, FIELD_END_X * 2, to_int(base_damage), &[])
    else {
        return;
    };
    let id = state.ids.next_projectile();
    state.projectiles.push(Projectile {
        id,
        source: ProjectileSource::Fortress,
        class: state.fortress_class,
        target,
        pos: origin,
        speed: FORTRESS_PROJECTILE_SPEED,
        base_damage,
        pierce_left: state.modifiers.pierce,
        hit: Vec::new(),
    });
    state.fortress_attack_cooldown = state.modifiers.scaled_interval(interval);
}

/// Regrowth: heal the fortress on a fixed pulse.
pub fn fortress_regen(state: &mut GameState) {
    let regen = state.modifiers.fortress_regen;
    if regen > 0 && state.tick % REGEN_PULSE_TICKS == 0 {
        state.fortress_hp = (state.fortress_hp + regen).min(state.fortress_max_hp);
    }
}

// ============================================================================
// Walls & Militia
// ============================================================================

pub fn place_wall(state: &mut GameState, lane: u8, x: Fp) {
    let id = state.ids.next_wall();
    state.walls.push(Wall {
        id,
        lane,
        x,
        hp: WALL_HP,
        max_hp: WALL_HP,
    });
}

pub fn deploy_militia(state: &mut GameState, lane: u8) {
    for n in 0..MILITIA_SQUAD_SIZE {
        let id = state.ids.next_militia();
        state.militia.push(Militia {
            id,
            lane,
            pos: FpVec2::new(MILITIA_X + i32::from(n) * (ONE / 2), lane_y(lane)),
            hp: MILITIA_HP,
            damage: MILITIA_DAMAGE,
            attack_cooldown: 0,
            remaining: MILITIA_LIFETIME,
        });
    }
}

/// Militia strike the nearest enemy in their lane and expire over time.
pub fn update_militia(state: &mut GameState) {
    for i in 0..state.militia.len() {
        let m = &mut state.militia[i];
        m.remaining = m.remaining.saturating_sub(1);
        m.attack_cooldown = m.attack_cooldown.saturating_sub(1);
        if m.hp <= 0 || m.remaining == 0 || m.attack_cooldown > 0 {
            continue;
        }
        let (lane, origin, damage) = (m.lane, m.pos, m.damage);
        let range_sq = mul(MILITIA_RANGE, MILITIA_RANGE);
        let Some((_, target)) = state
            .enemies
            .iter()
            .filter(|e| e.is_alive() && e.lane == lane)
            .map(|e| (e.pos.dist_sq(origin), e.id))
            .filter(|(d, _)| *d <= range_sq)
            .min()
        else {
            continue;
        };
        if let Some(idx) = state.enemy_index(target) {
            apply_damage(&mut state.enemies[idx], damage);
            state.militia[i].attack_cooldown = MILITIA_ATTACK_INTERVAL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EnemyKind;
    use crate::state::Enemy;

    fn base_state() -> GameState {
        crate::simulation::Simulation::new(3, Default::default())
            .map(|sim| sim.state().clone())
            .unwrap()
    }

    fn grunt(id: EntityId, x: i32, lane: u8) -> Enemy {
        let stats = EnemyKind::Grunt.stats();
        Enemy {
            id,
            kind: EnemyKind::Grunt,
            elite: false,
            hp: stats.max_hp,
            max_hp: stats.max_hp,
            shield: 0,
            pos: FpVec2::new(from_int(x), lane_y(lane)),
            vel: FpVec2::ZERO,
            lane,
            target_lane: lane,
            speed: stats.speed,
            damage: stats.damage,
            attack_cooldown: 0,
            engaged: false,
            statuses: Vec::new(),
        }
    }

    #[test]
    fn test_turret_fires_projectile() {
        let mut state = base_state();
        state.enemies.push(grunt(1, 10, 0));
        update_turrets(&mut state);
        assert_eq!(state.projectiles.len(), 1);
        assert_eq!(state.projectiles[0].target, 1);
        assert!(state.turrets[0].attack_cooldown > 0);
    }

    #[test]
    fn test_fortress_holds_fire_without_targets() {
        let mut state = base_state();
        state.fortress_attack_cooldown = 0;
        fortress_attack(&mut state, from_int(12), 20);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_skill_respects_cooldown() {
        let mut state = base_state();
        state.enemies.push(grunt(1, 10, 0));
        let hero_id = state.heroes[0].id;
        let mut rng = Xorshift32::new(1);
        assert!(activate_skill(&mut state, &mut rng, hero_id));
        assert!(state.enemies[0].hp < EnemyKind::Grunt.stats().max_hp);
        assert!(!activate_skill(&mut state, &mut rng, hero_id));
        assert!(!activate_skill(&mut state, &mut rng, 999));
    }

    #[test]
    fn test_militia_expire() {
        let mut state = base_state();
        deploy_militia(&mut state, 1);
        assert_eq!(state.militia.len(), usize::from(MILITIA_SQUAD_SIZE));
        for _ in 0..MILITIA_LIFETIME {
            update_militia(&mut state);
        }
        assert!(state.militia.iter().all(|m| m.remaining == 0));
    }

    #[test]
    fn test_militia_hit_only_their_lane() {
        let mut state = base_state();
        deploy_militia(&mut state, 1);
        state.enemies.push(grunt(1, 9, 0));
        state.enemies.push(grunt(2, 10, 1));
        update_militia(&mut state);
        assert_eq!(state.enemies[0].hp, EnemyKind::Grunt.stats().max_hp);
        assert!(state.enemies[1].hp < EnemyKind::Grunt.stats().max_hp);
    }
}
