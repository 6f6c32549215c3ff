//! Wave composition, spawning, and wave-completion rewards.

use std::collections::VecDeque;

use tracing::trace;

use crate::config::SimConfig;
use crate::content::{ArtifactKind, EnemyKind, FIELD_END_X, LANE_COUNT, Pillar, lane_y};
use crate::fixed::{Fp, FpVec2, ONE, from_pct};
use crate::rng::Xorshift32;
use crate::state::{Enemy, GameState, Phase, SpawnEntry};

/// Every this many waves, a boss closes the wave.
pub const BOSS_WAVE_INTERVAL: u32 = 10;
/// Upper bound on regular enemies per wave.
pub const MAX_WAVE_ENEMIES: u32 = 40;

/// Regular enemies in `wave`: `6 + 2 * wave`, capped.
pub fn wave_enemy_count(wave: u32) -> u32 {
    wave.saturating_mul(2).saturating_add(6).min(MAX_WAVE_ENEMIES)
}

/// Elite chance: 2% per wave, capped at 40%.
pub fn elite_chance(wave: u32) -> Fp {
    from_pct(wave.min(20) as i32 * 2)
}

pub fn is_boss_wave(wave: u32) -> bool {
    wave > 0 && wave % BOSS_WAVE_INTERVAL == 0
}

/// Enemy HP grows 12% per wave after the first.
pub fn hp_scaling(wave: u32) -> Fp {
    let steps = wave.saturating_sub(1).min(5_000) as i32;
    ONE.saturating_add(steps.saturating_mul(from_pct(12)))
}

/// XP for clearing `wave`, before bonuses.
pub fn wave_xp(wave: u32) -> u32 {
    wave.saturating_mul(2).saturating_add(10)
}

/// `value * factor` in 64 bits, at least 1 and saturating.
fn scale_stat(value: i32, factor: Fp) -> i32 {
    let scaled = (i64::from(value) * i64::from(factor)) >> 16;
    scaled.clamp(1, i64::from(i32::MAX / 4)) as i32
}

/// Draw the spawn queue for `wave` from the pillar's pool.
pub fn build_wave(wave: u32, pillar: Pillar, rng: &mut Xorshift32) -> VecDeque<SpawnEntry> {
    let pool = pillar.enemy_pool();
    let count = wave_enemy_count(wave);
    let elite_p = elite_chance(wave);
    let mut queue = VecDeque::with_capacity(count as usize + 1);
    for i in 0..count {
        let kind = pool[rng.next_int(pool.len() as u32) as usize];
        let elite = rng.chance(elite_p);
        let lane = rng.next_int(u32::from(LANE_COUNT)) as u8;
        let delay = if i == 0 {
            0
        } else {
            rng.range_inclusive(8, 20) as u32
        };
        queue.push_back(SpawnEntry {
            kind,
            elite,
            lane,
            delay,
        });
    }
    if is_boss_wave(wave) {
        queue.push_back(SpawnEntry {
            kind: EnemyKind::Overlord,
            elite: false,
            lane: LANE_COUNT / 2,
            delay: 30,
        });
    }
    queue
}

/// Begin the next wave.
pub fn start_next_wave(state: &mut GameState, config: &SimConfig, rng: &mut Xorshift32) {
    state.wave += 1;
    state.pillar = Pillar::for_wave(state.wave, &config.unlocked_pillars);
    state.spawn_queue = build_wave(state.wave, state.pillar, rng);
    state.spawn_cooldown = 0;
    state.wave_active = true;
    trace!(wave = state.wave, pillar = ?state.pillar, enemies = state.spawn_queue.len(), "wave started");
}

/// Spawn the next queued enemy once its delay has elapsed.
pub fn spawn_due(state: &mut GameState) {
    if state.spawn_cooldown > 0 {
        state.spawn_cooldown -= 1;
        return;
    }
    let Some(entry) = state.spawn_queue.pop_front() else {
        return;
    };
    spawn_enemy(state, entry);
    state.spawn_cooldown = state.spawn_queue.front().map_or(0, |next| next.delay);
}

fn spawn_enemy(state: &mut GameState, entry: SpawnEntry) {
    let stats = entry.kind.stats();
    let pillar = state.pillar_modifiers;
    let hp_factor = crate::fixed::mul(hp_scaling(state.wave), pillar.enemy_hp_multiplier);
    let mut max_hp = scale_stat(stats.max_hp, hp_factor);
    let mut damage = scale_stat(stats.damage, pillar.enemy_damage_multiplier);
    if entry.elite {
        max_hp = max_hp.saturating_mul(2);
        damage = damage.saturating_add(damage / 2);
    }
    let id = state.ids.next_enemy();
    state.enemies.push(Enemy {
        id,
        kind: entry.kind,
        elite: entry.elite,
        hp: max_hp,
        max_hp,
        shield: 0,
        pos: FpVec2::new(FIELD_END_X, lane_y(entry.lane)),
        vel: FpVec2::ZERO,
        lane: entry.lane,
        target_lane: entry.lane,
        speed: crate::fixed::mul(stats.speed, pillar.enemy_speed_multiplier),
        damage,
        attack_cooldown: 0,
        engaged: false,
        statuses: Vec::new(),
    });
}

/// A wave is complete when its queue is drained and no enemies remain.
pub fn is_wave_complete(state: &GameState) -> bool {
    state.wave_active && state.spawn_queue.is_empty() && state.enemies.is_empty()
}

/// Material drop chance on wave completion.
pub const MATERIAL_DROP_CHANCE: Fp = from_pct(40);
/// Artifact drop chance on boss waves.
pub const ARTIFACT_DROP_CHANCE: Fp = from_pct(25);

/// Wave-completion bookkeeping: XP, drops, heals, victory.
pub fn complete_wave(state: &mut GameState, config: &SimConfig, rng: &mut Xorshift32) {
    let wave = state.wave;
    state.wave_active = false;
    state.stats.waves_cleared += 1;
    state.earn_xp(wave_xp(wave));

    let pool = state.pillar.material_pool();
    if rng.chance(MATERIAL_DROP_CHANCE) {
        let material = pool[rng.next_int(pool.len() as u32) as usize];
        state.add_material(material, 1 + wave / 10);
    }
    if is_boss_wave(wave) {
        let material = pool[rng.next_int(pool.len() as u32) as usize];
        state.add_material(material, 2 + wave / 10);
        if rng.chance(ARTIFACT_DROP_CHANCE) {
            let artifact = ArtifactKind::ALL[rng.next_int(ArtifactKind::ALL.len() as u32) as usize];
            state.segment_artifacts_earned.push(artifact);
        }
    }

    for hero in state.heroes.iter_mut() {
        hero.hp = hero.max_hp;
    }
    for turret in state.turrets.iter_mut() {
        turret.hp = turret.max_hp;
    }

    state.wave_countdown = config.wave_interval;
    if !config.endless && wave >= config.max_waves {
        state.phase = Phase::Won;
    }
    trace!(wave, xp = state.segment_xp_earned, "wave cleared");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_counts() {
        assert_eq!(wave_enemy_count(1), 8);
        assert_eq!(wave_enemy_count(5), 16);
        assert_eq!(wave_enemy_count(100), MAX_WAVE_ENEMIES);
    }

    #[test]
    fn test_boss_every_tenth_wave() {
        let mut rng = Xorshift32::new(5);
        let wave9 = build_wave(9, Pillar::Streets, &mut rng);
        assert!(wave9.iter().all(|e| e.kind != EnemyKind::Overlord));
        let wave10 = build_wave(10, Pillar::Streets, &mut rng);
        assert_eq!(wave10.back().map(|e| e.kind), Some(EnemyKind::Overlord));
        assert_eq!(wave10.len() as u32, wave_enemy_count(10) + 1);
    }

    #[test]
    fn test_wave_draws_from_pillar_pool() {
        let mut rng = Xorshift32::new(77);
        let queue = build_wave(3, Pillar::Cosmos, &mut rng);
        let pool = Pillar::Cosmos.enemy_pool();
        assert!(queue.iter().all(|e| pool.contains(&e.kind)));
        assert!(queue.iter().all(|e| e.lane < LANE_COUNT));
        assert_eq!(queue.front().map(|e| e.delay), Some(0));
    }

    #[test]
    fn test_same_seed_same_wave() {
        let a = build_wave(7, Pillar::Magic, &mut Xorshift32::new(9));
        let b = build_wave(7, Pillar::Magic, &mut Xorshift32::new(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_elite_chance_capped() {
        assert_eq!(elite_chance(1), from_pct(2));
        assert_eq!(elite_chance(500), from_pct(40));
    }
}
