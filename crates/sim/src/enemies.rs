//! Enemy movement, melee, and special abilities.
//!
//! Movement is friction-damped: velocity eases toward the desired velocity
//! each tick, then position integrates velocity. Enemies stop when they
//! reach a blocker (wall, militia) or their attack threshold near the
//! fortress, and attack whatever stopped them.

use crate::content::{ENEMY_STOP_X, FORTRESS_X, LANE_COUNT, Special, lane_y};
use crate::fixed::{Fp, FpVec2, ONE, from_int, from_pct, mul, to_int};
use crate::rng::Xorshift32;
use crate::state::{EntityId, GameState};

/// Fraction of velocity kept each tick.
pub const FRICTION: Fp = from_pct(80);
/// Distance at which an enemy is stopped by a wall or militia.
pub const CONTACT_RANGE: Fp = ONE;
/// Chance a blocked enemy tries another lane when its attack comes up.
pub const LANE_SWITCH_CHANCE: Fp = from_pct(20);
/// Lateral speed while changing lanes.
pub const LANE_CHANGE_SPEED: Fp = from_pct(8);

/// What an enemy is attacking this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocker {
    Wall(usize),
    Militia(usize),
    /// At the stop line: hero in lane, else the fortress.
    Front,
    /// Siege units at bombard range; their special does the attacking.
    SiegeLine,
}

/// X at which this enemy stops advancing.
fn stop_x(special: Special) -> Fp {
    match special {
        Special::Siege { range, .. } => FORTRESS_X + range,
        _ => ENEMY_STOP_X,
    }
}

// ============================================================================
// Movement
// ============================================================================

pub fn update_movement(state: &mut GameState, rng: &mut Xorshift32) {
    for i in 0..state.enemies.len() {
        if !state.enemies[i].is_alive() {
            continue;
        }
        let enemy = &state.enemies[i];
        let special = enemy.kind.stats().special;
        let wall_multiplier = match special {
            Special::WallBreaker {
                wall_damage_multiplier,
            } => wall_damage_multiplier,
            _ => 1,
        };

        let blocker = find_blocker(state, i, special);
        let enemy = &mut state.enemies[i];
        enemy.attack_cooldown = enemy.attack_cooldown.saturating_sub(1);

        if enemy.speed_factor() == 0 {
            enemy.vel = FpVec2::ZERO;
            continue;
        }

        // Lane seeking: drift toward the target lane's centre line.
        if enemy.lane != enemy.target_lane {
            let target_y = lane_y(enemy.target_lane);
            let dy = target_y - enemy.pos.y;
            let step = mul(LANE_CHANGE_SPEED, enemy.speed_factor());
            if dy.abs() <= step {
                enemy.pos.y = target_y;
                enemy.lane = enemy.target_lane;
            } else {
                enemy.pos.y += if dy > 0 { step } else { -step };
            }
        }

        let Some(blocker) = blocker else {
            enemy.engaged = false;
            let desired = -mul(enemy.speed, enemy.speed_factor());
            enemy.vel.x = mul(enemy.vel.x, FRICTION) + mul(desired, ONE - FRICTION);
            enemy.vel.y = 0;
            enemy.pos.x = (enemy.pos.x + enemy.vel.x).max(stop_x(special));
            continue;
        };

        enemy.engaged = true;
        enemy.vel = FpVec2::ZERO;
        if blocker == Blocker::SiegeLine || enemy.attack_cooldown > 0 {
            continue;
        }
        let damage = enemy.damage;
        enemy.attack_cooldown = enemy.kind.stats().attack_interval;

        match blocker {
            Blocker::Wall(w) => {
                let wall = &mut state.walls[w];
                wall.hp -= damage.saturating_mul(wall_multiplier);
                // Sappers want the wall; everyone else may look for a way round.
                if wall_multiplier == 1 && rng.chance(LANE_SWITCH_CHANCE) {
                    let enemy = &mut state.enemies[i];
                    let offset = 1 + rng.next_int(u32::from(LANE_COUNT) - 1) as u8;
                    enemy.target_lane = (enemy.lane + offset) % LANE_COUNT;
                }
            }
            Blocker::Militia(m) => {
                state.militia[m].hp -= damage;
            }
            Blocker::Front => {
                let lane = state.enemies[i].lane;
                match state.alive_hero_in_lane(lane) {
                    Some(h) => state.heroes[h].hp = (state.heroes[h].hp - damage).max(0),
                    None => state.fortress_hp -= damage,
                }
            }
            Blocker::SiegeLine => {}
        }
    }
}

fn find_blocker(state: &GameState, i: usize, special: Special) -> Option<Blocker> {
    let enemy = &state.enemies[i];
    let x = enemy.pos.x;
    if enemy.lane == enemy.target_lane {
        let wall = state.walls.iter().position(|w| {
            w.hp > 0 && w.lane == enemy.lane && w.x <= x && x - w.x <= CONTACT_RANGE
        });
        if let Some(w) = wall {
            return Some(Blocker::Wall(w));
        }
        let militia = state.militia.iter().position(|m| {
            m.hp > 0 && m.lane == enemy.lane && (m.pos.x - x).abs() <= CONTACT_RANGE
        });
        if let Some(m) = militia {
            return Some(Blocker::Militia(m));
        }
    }
    if x <= stop_x(special) {
        return Some(match special {
            Special::Siege { .. } => Blocker::SiegeLine,
            _ => Blocker::Front,
        });
    }
    None
}

// ============================================================================
// Specials
// ============================================================================

/// Run each live enemy's special ability. Cooldowns live in the
/// simulation's ability table, keyed by enemy id.
pub fn update_specials(state: &mut GameState, rng: &mut Xorshift32) {
    for i in 0..state.enemies.len() {
        let enemy = &state.enemies[i];
        if !enemy.is_alive() || enemy.speed_factor() == 0 {
            continue;
        }
        let id = enemy.id;
        match enemy.kind.stats().special {
            Special::None => {}
            Special::Siege {
                range,
                interval,
                damage,
            } => siege(state, rng, i, range, interval, damage),
            Special::HealAura {
                radius,
                amount,
                interval,
            } => {
                if ability_ready(state, id, interval) {
                    heal_aura(state, i, radius, amount);
                }
            }
            Special::ShieldAura {
                radius,
                shield,
                interval,
            } => {
                if ability_ready(state, id, interval) {
                    shield_aura(state, i, radius, shield);
                }
            }
            Special::Teleport { distance, interval } => {
                if !state.enemies[i].engaged && ability_ready(state, id, interval) {
                    teleport(state, rng, i, distance);
                }
            }
            Special::WallBreaker { .. } => seek_wall(state, i),
        }
    }
}

/// Tick the ability cooldown; true (and reset) when it fires.
fn ability_ready(state: &mut GameState, id: EntityId, interval: u32) -> bool {
    let ability = state.abilities.entry(id, interval);
    ability.cooldown = ability.cooldown.saturating_sub(1);
    if ability.cooldown > 0 {
        return false;
    }
    ability.cooldown = interval;
    ability.uses += 1;
    true
}

/// Bombard a turret (one shot in three, lowest HP first) or the fortress.
fn siege(state: &mut GameState, rng: &mut Xorshift32, i: usize, range: Fp, interval: u32, damage: i32) {
    let enemy = &state.enemies[i];
    if enemy.pos.x > FORTRESS_X + range {
        return;
    }
    let id = enemy.id;
    if !ability_ready(state, id, interval) {
        return;
    }
    let damage = to_int(mul(from_int(damage), state.pillar_modifiers.enemy_damage_multiplier)).max(1);
    let target_turret = if rng.chance(ONE / 3) {
        state
            .turrets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_alive())
            .min_by_key(|(_, t)| (t.hp, t.id))
            .map(|(idx, _)| idx)
    } else {
        None
    };
    match target_turret {
        Some(t) => state.turrets[t].hp = (state.turrets[t].hp - damage).max(0),
        None => state.fortress_hp -= damage,
    }
}

fn heal_aura(state: &mut GameState, i: usize, radius: Fp, amount: i32) {
    let center = state.enemies[i].pos;
    let radius_sq = mul(radius, radius);
    for ally in state.enemies.iter_mut() {
        if ally.is_alive() && ally.pos.dist_sq(center) <= radius_sq {
            ally.hp = (ally.hp + amount).min(ally.max_hp);
        }
    }
}

fn shield_aura(state: &mut GameState, i: usize, radius: Fp, shield: i32) {
    let center = state.enemies[i].pos;
    let radius_sq = mul(radius, radius);
    for ally in state.enemies.iter_mut() {
        if ally.is_alive() && ally.pos.dist_sq(center) <= radius_sq {
            ally.shield = ally.shield.max(shield);
        }
    }
}

/// Blink forward a jittered distance into a random lane.
fn teleport(state: &mut GameState, rng: &mut Xorshift32, i: usize, distance: Fp) {
    let jitter = rng.range_inclusive(-ONE, ONE);
    let lane = rng.next_int(u32::from(LANE_COUNT)) as u8;
    let enemy = &mut state.enemies[i];
    enemy.pos.x = (enemy.pos.x - distance - jitter).max(ENEMY_STOP_X);
    enemy.lane = lane;
    enemy.target_lane = lane;
    enemy.pos.y = lane_y(lane);
    enemy.vel = FpVec2::ZERO;
}

/// Steer toward the lane of the first standing wall ahead.
fn seek_wall(state: &mut GameState, i: usize) {
    let enemy = &state.enemies[i];
    if enemy.engaged {
        return;
    }
    let x = enemy.pos.x;
    if let Some(lane) = state.walls.iter().find(|w| w.hp > 0 && w.x <= x).map(|w| w.lane) {
        state.enemies[i].target_lane = lane;
    }
}
