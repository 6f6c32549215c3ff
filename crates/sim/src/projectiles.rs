//! Homing projectiles fired by turrets and the fortress.

use crate::combat::{self, Hit};
use crate::fixed::{Fp, from_int, mul};
use crate::rng::Xorshift32;
use crate::state::GameState;

/// Projectiles retarget within this range when their target dies or they pierce.
pub const RETARGET_RANGE: Fp = from_int(6);

/// Move every projectile toward its target and resolve hits. Projectiles
/// without a live target retarget to the nearest enemy not yet struck, or
/// are dropped.
pub fn update_projectiles(state: &mut GameState, rng: &mut Xorshift32) {
    let projectiles = std::mem::take(&mut state.projectiles);
    let mut kept = Vec::with_capacity(projectiles.len());

    for mut p in projectiles {
        let Some(target_pos) = state.enemy(p.target).filter(|e| e.is_alive()).map(|e| e.pos)
        else {
            if let Some(next) = combat::nearest_enemy(&state.enemies, p.pos, RETARGET_RANGE, &p.hit) {
                p.target = next;
                kept.push(p);
            }
            continue;
        };

        let to_target = target_pos.sub(p.pos);
        if to_target.length_sq() > mul(p.speed, p.speed) {
            p.pos = p.pos.add(to_target.normalize().scale(p.speed));
            kept.push(p);
            continue;
        }

        p.pos = target_pos;
        combat::resolve_hit(
            state,
            rng,
            Hit {
                target: p.target,
                base: p.base_damage,
                class: p.class,
                can_crit: true,
            },
        );
        p.hit.push(p.target);

        if p.pierce_left == 0 {
            continue;
        }
        p.pierce_left -= 1;
        if let Some(next) = combat::nearest_enemy(&state.enemies, p.pos, RETARGET_RANGE, &p.hit) {
            p.target = next;
            kept.push(p);
        }
    }

    state.projectiles = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{EnemyKind, FortressClass, lane_y};
    use crate::fixed::{FpVec2, ONE};
    use crate::state::{Enemy, EntityId, Projectile, ProjectileSource};

    fn base_state() -> GameState {
        crate::simulation::Simulation::new(3, Default::default())
            .map(|sim| sim.state().clone())
            .unwrap()
    }

    fn grunt(id: EntityId, x: i32) -> Enemy {
        let stats = EnemyKind::Grunt.stats();
        Enemy {
            id,
            kind: EnemyKind::Grunt,
            elite: false,
            hp: stats.max_hp,
            max_hp: stats.max_hp,
            shield: 0,
            pos: FpVec2::new(from_int(x), lane_y(0)),
            vel: FpVec2::ZERO,
            lane: 0,
            target_lane: 0,
            speed: stats.speed,
            damage: stats.damage,
            attack_cooldown: 0,
            engaged: false,
            statuses: Vec::new(),
        }
    }

    fn projectile(target: EntityId, x: i32, pierce: u8) -> Projectile {
        Projectile {
            id: 1,
            source: ProjectileSource::Fortress,
            class: FortressClass::Tech,
            target,
            pos: FpVec2::new(from_int(x), lane_y(0)),
            speed: ONE,
            base_damage: from_int(5),
            pierce_left: pierce,
            hit: Vec::new(),
        }
    }

    #[test]
    fn test_projectile_travels_then_hits() {
        let mut state = base_state();
        state.enemies.push(grunt(1, 10));
        state.projectiles.push(projectile(1, 7, 0));
        let mut rng = Xorshift32::new(1);

        update_projectiles(&mut state, &mut rng);
        assert_eq!(state.projectiles.len(), 1);
        assert_eq!(state.projectiles[0].pos.x, from_int(8));

        update_projectiles(&mut state, &mut rng);
        update_projectiles(&mut state, &mut rng);
        assert!(state.projectiles.is_empty());
        assert!(state.enemies[0].hp < EnemyKind::Grunt.stats().max_hp);
    }

    #[test]
    fn test_pierce_moves_on_to_next_enemy() {
        let mut state = base_state();
        state.enemies.push(grunt(1, 10));
        state.enemies.push(grunt(2, 12));
        state.projectiles.push(projectile(1, 10, 1));
        update_projectiles(&mut state, &mut Xorshift32::new(1));
        assert_eq!(state.projectiles.len(), 1);
        assert_eq!(state.projectiles[0].target, 2);
        assert_eq!(state.projectiles[0].hit, vec![1]);
    }

    #[test]
    fn test_orphaned_projectile_dropped() {
        let mut state = base_state();
        state.projectiles.push(projectile(42, 10, 0));
        update_projectiles(&mut state, &mut Xorshift32::new(1));
        assert!(state.projectiles.is_empty());
    }
}
