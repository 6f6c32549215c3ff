//! State hashing and the checkpoint hash chain.
//!
//! All hashes are FNV-1a 64 over little-endian encodings of state fields,
//! visited in a fixed order. Entity collections are already in ascending id
//! order, so no sorting happens here.

use std::collections::BTreeSet;

use crate::Tick;
use crate::state::{Enemy, GameState, ProjectileSource};

// ============================================================================
// FNV-1a 64
// ============================================================================

const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

/// Digest algorithm identifier, recorded alongside hashes on the wire.
pub const STATE_HASH_ALGO_ID: &str = "bastion-fnv1a64-le-q16";

/// FNV-1a 64-bit hasher.
#[derive(Debug, Clone)]
pub struct StateHasher {
    state: u64,
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHasher {
    pub fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.update(&[v]);
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    pub fn u32(&mut self, v: u32) {
        self.update(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.update(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.update(&v.to_le_bytes());
    }

    /// Collection length prefix, so adjacent collections can't alias.
    pub fn count(&mut self, n: usize) {
        self.u32(n as u32);
    }

    pub fn finish(self) -> u64 {
        self.state
    }
}

// ============================================================================
// Hashes
// ============================================================================

/// Hash of the checkpointed subset: tick, wave, fortress HP, every entity's
/// id/position/HP, RNG state and the reward accumulators.
pub fn state_hash(state: &GameState) -> u64 {
    let mut h = StateHasher::new();
    h.u64(state.tick);
    h.u32(state.wave);
    h.i32(state.fortress_hp);
    h.u32(state.rng_state);

    h.count(state.enemies.len());
    for e in &state.enemies {
        h.u32(e.id);
        h.i32(e.pos.x);
        h.i32(e.pos.y);
        h.i32(e.hp);
    }
    h.count(state.heroes.len());
    for hero in &state.heroes {
        h.u32(hero.id);
        h.i32(hero.pos.x);
        h.i32(hero.pos.y);
        h.i32(hero.hp);
    }
    h.count(state.turrets.len());
    for t in &state.turrets {
        h.u32(t.id);
        h.i32(t.pos.x);
        h.i32(t.pos.y);
        h.i32(t.hp);
    }
    h.count(state.projectiles.len());
    for p in &state.projectiles {
        h.u32(p.id);
        h.i32(p.pos.x);
        h.i32(p.pos.y);
    }
    h.count(state.walls.len());
    for w in &state.walls {
        h.u32(w.id);
        h.i32(w.x);
        h.i32(w.hp);
    }
    h.count(state.militia.len());
    for m in &state.militia {
        h.u32(m.id);
        h.i32(m.pos.x);
        h.i32(m.pos.y);
        h.i32(m.hp);
    }

    hash_rewards(&mut h, state);
    h.finish()
}

/// Hash of the complete post-segment state. Independent of the checkpoint
/// chain; this is the pass/fail gate for a whole segment.
pub fn final_hash(state: &GameState) -> u64 {
    let mut h = StateHasher::new();
    h.u64(state.tick);
    h.u32(state.wave);
    h.u32(state.phase.id());
    h.u32(state.rng_state);
    h.u32(state.fortress_class.id());
    h.i32(state.fortress_hp);
    h.i32(state.fortress_max_hp);
    h.u32(state.fortress_attack_cooldown);

    h.count(state.enemies.len());
    for e in &state.enemies {
        hash_enemy(&mut h, e);
    }
    h.count(state.heroes.len());
    for hero in &state.heroes {
        h.u32(hero.id);
        h.u32(hero.kind.id());
        h.u8(hero.lane);
        h.i32(hero.pos.x);
        h.i32(hero.pos.y);
        h.i32(hero.hp);
        h.i32(hero.max_hp);
        h.u32(hero.attack_cooldown);
        h.u32(hero.skill_cooldown);
    }
    h.count(state.turrets.len());
    for t in &state.turrets {
        h.u32(t.id);
        h.u32(t.kind.id());
        h.u8(t.slot);
        h.i32(t.hp);
        h.i32(t.max_hp);
        h.u32(t.attack_cooldown);
    }
    h.count(state.projectiles.len());
    for p in &state.projectiles {
        h.u32(p.id);
        match p.source {
            ProjectileSource::Fortress => h.u32(0),
            ProjectileSource::Turret(id) => {
                h.u32(1);
                h.u32(id);
            }
        }
        h.u32(p.class.id());
        h.u32(p.target);
        h.i32(p.pos.x);
        h.i32(p.pos.y);
        h.i32(p.speed);
        h.i32(p.base_damage);
        h.u8(p.pierce_left);
        h.count(p.hit.len());
        for id in &p.hit {
            h.u32(*id);
        }
    }
    h.count(state.walls.len());
    for w in &state.walls {
        h.u32(w.id);
        h.u8(w.lane);
        h.i32(w.x);
        h.i32(w.hp);
        h.i32(w.max_hp);
    }
    h.count(state.militia.len());
    for m in &state.militia {
        h.u32(m.id);
        h.u8(m.lane);
        h.i32(m.pos.x);
        h.i32(m.pos.y);
        h.i32(m.hp);
        h.i32(m.damage);
        h.u32(m.attack_cooldown);
        h.u32(m.remaining);
    }

    h.u32(state.ids.enemy);
    h.u32(state.ids.hero);
    h.u32(state.ids.turret);
    h.u32(state.ids.projectile);
    h.u32(state.ids.wall);
    h.u32(state.ids.militia);

    h.count(state.abilities.len());
    for (id, ability) in state.abilities.iter() {
        h.u32(*id);
        h.u32(ability.cooldown);
        h.u32(ability.uses);
    }

    h.count(state.relics.len());
    for relic in &state.relics {
        h.u32(relic.id());
    }
    h.u32(state.pillar.id());

    let m = &state.modifiers;
    for v in [
        m.damage_bonus,
        m.attack_speed_bonus,
        m.crit_chance,
        m.crit_damage_bonus,
        m.max_hp_bonus,
        m.chain_chance,
        m.splash_radius,
        m.splash_fraction,
        m.gold_bonus,
        m.xp_bonus,
        m.execute_threshold,
        m.execute_bonus,
        m.low_hp_threshold,
        m.low_hp_bonus,
        m.elite_damage_bonus,
        m.cooldown_reduction,
        m.fortress_regen,
    ] {
        h.i32(v);
    }
    h.u8(m.chain_count);
    h.u8(m.pierce);
    h.i32(state.synergy_modifiers.damage_bonus);
    h.i32(state.pillar_modifiers.enemy_hp_multiplier);

    h.bool(state.wave_active);
    h.count(state.spawn_queue.len());
    for entry in &state.spawn_queue {
        h.u32(entry.kind.id());
        h.bool(entry.elite);
        h.u8(entry.lane);
        h.u32(entry.delay);
    }
    h.u32(state.spawn_cooldown);
    h.u32(state.wave_countdown);
    match &state.relic_choice {
        None => h.bool(false),
        Some(choice) => {
            h.bool(true);
            h.count(choice.options.len());
            for relic in &choice.options {
                h.u32(relic.id());
            }
            h.u32(choice.rerolls);
        }
    }

    h.u32(state.wallet_gold);
    hash_rewards(&mut h, state);
    h.u32(state.stats.kills);
    h.u32(state.stats.elite_kills);
    h.u32(state.stats.boss_kills);
    h.u32(state.stats.retries);
    h.u32(state.stats.waves_cleared);
    h.finish()
}

fn hash_enemy(h: &mut StateHasher, e: &Enemy) {
    h.u32(e.id);
    h.u32(e.kind.id());
    h.bool(e.elite);
    h.i32(e.hp);
    h.i32(e.max_hp);
    h.i32(e.shield);
    h.i32(e.pos.x);
    h.i32(e.pos.y);
    h.i32(e.vel.x);
    h.i32(e.vel.y);
    h.u8(e.lane);
    h.u8(e.target_lane);
    h.i32(e.speed);
    h.i32(e.damage);
    h.u32(e.attack_cooldown);
    h.bool(e.engaged);
    h.count(e.statuses.len());
    for s in &e.statuses {
        h.u32(s.kind.id());
        h.u32(s.remaining);
        h.i32(s.magnitude);
    }
}

fn hash_rewards(h: &mut StateHasher, state: &GameState) {
    h.u64(state.segment_gold_earned);
    h.u64(state.segment_dust_earned);
    h.u64(state.segment_xp_earned);
    h.count(state.segment_materials_earned.len());
    for (material, amount) in &state.segment_materials_earned {
        h.u32(material.id());
        h.u32(*amount);
    }
    h.count(state.segment_artifacts_earned.len());
    for artifact in &state.segment_artifacts_earned {
        h.u32(artifact.id());
    }
}

/// Link a state hash to the previous chain hash.
pub fn chain_hash(state_hash: u64, previous_chain_hash: u64) -> u64 {
    let mut h = StateHasher::new();
    h.u64(state_hash);
    h.u64(previous_chain_hash);
    h.finish()
}

// ============================================================================
// Checkpoints
// ============================================================================

/// Previous chain hash of the first checkpoint in a segment.
pub const GENESIS_CHAIN_HASH: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub tick: Tick,
    pub state_hash: u64,
    pub chain_hash: u64,
}

/// Append-only checkpoint sequence for one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointChain {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_chain_hash(&self) -> u64 {
        self.checkpoints
            .last()
            .map_or(GENESIS_CHAIN_HASH, |c| c.chain_hash)
    }

    /// Snapshot `state`. A later snapshot on the same tick replaces the
    /// earlier one, so a scheduled checkpoint on a wave-completion tick
    /// includes that wave's rewards.
    pub fn record(&mut self, state: &GameState) -> Checkpoint {
        if self.checkpoints.last().is_some_and(|c| c.tick == state.tick) {
            self.checkpoints.pop();
        }
        let state_hash = state_hash(state);
        let checkpoint = Checkpoint {
            tick: state.tick,
            state_hash,
            chain_hash: chain_hash(state_hash, self.last_chain_hash()),
        };
        self.checkpoints.push(checkpoint);
        checkpoint
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn find(&self, tick: Tick) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.tick == tick)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Reset for the next segment.
    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }
}

/// A broken link found by `verify_chain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBreak {
    pub index: usize,
    pub tick: Tick,
}

/// Recompute every link from the genesis hash. Ticks must strictly increase.
pub fn verify_chain(checkpoints: &[Checkpoint]) -> Result<(), ChainBreak> {
    let mut previous = GENESIS_CHAIN_HASH;
    let mut last_tick = None;
    for (index, c) in checkpoints.iter().enumerate() {
        let ordered = last_tick.is_none_or(|t| c.tick > t);
        if !ordered || chain_hash(c.state_hash, previous) != c.chain_hash {
            return Err(ChainBreak {
                index,
                tick: c.tick,
            });
        }
        previous = c.chain_hash;
        last_tick = Some(c.tick);
    }
    Ok(())
}

// ============================================================================
// Schedule
// ============================================================================

/// Ticks at which a checkpoint must be taken: every `interval` ticks plus
/// the server's audit ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSchedule {
    interval: u32,
    audit_ticks: BTreeSet<Tick>,
}

impl CheckpointSchedule {
    pub fn new(interval: u32, audit_ticks: impl IntoIterator<Item = Tick>) -> Self {
        Self {
            interval,
            audit_ticks: audit_ticks.into_iter().collect(),
        }
    }

    pub fn is_due(&self, tick: Tick) -> bool {
        let scheduled = self.interval > 0 && tick > 0 && tick % u64::from(self.interval) == 0;
        scheduled || self.audit_ticks.contains(&tick)
    }

    pub fn is_audit(&self, tick: Tick) -> bool {
        self.audit_ticks.contains(&tick)
    }

    pub fn audit_ticks(&self) -> impl Iterator<Item = Tick> + '_ {
        self.audit_ticks.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fnv(bytes: &[u8]) -> u64 {
        let mut h = StateHasher::new();
        h.update(bytes);
        h.finish()
    }

    #[test]
    fn test_fnv1a64_known_vectors() {
        assert_eq!(fnv(b""), 0xcbf29ce484222325);
        assert_eq!(fnv(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv(b"foobar"), 0x85944171f73967e8);
    }

    fn build_chain(hashes: &[(Tick, u64)]) -> Vec<Checkpoint> {
        let mut previous = GENESIS_CHAIN_HASH;
        hashes
            .iter()
            .map(|&(tick, state_hash)| {
                let chain = chain_hash(state_hash, previous);
                previous = chain;
                Checkpoint {
                    tick,
                    state_hash,
                    chain_hash: chain,
                }
            })
            .collect()
    }

    #[test]
    fn test_verify_chain_accepts_valid() {
        let chain = build_chain(&[(10, 1), (20, 2), (30, 3)]);
        assert_eq!(verify_chain(&chain), Ok(()));
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn test_tampering_breaks_later_links() {
        let mut chain = build_chain(&[(10, 1), (20, 2), (30, 3)]);
        chain[0].state_hash ^= 1;
        assert_eq!(verify_chain(&chain), Err(ChainBreak { index: 0, tick: 10 }));

        // Recomputing the first link alone still breaks the second.
        chain[0].chain_hash = chain_hash(chain[0].state_hash, GENESIS_CHAIN_HASH);
        assert_eq!(verify_chain(&chain), Err(ChainBreak { index: 1, tick: 20 }));
    }

    #[test]
    fn test_verify_chain_rejects_unordered_ticks() {
        let chain = build_chain(&[(20, 1), (10, 2)]);
        assert_eq!(verify_chain(&chain), Err(ChainBreak { index: 1, tick: 10 }));
    }

    #[test]
    fn test_schedule() {
        let schedule = CheckpointSchedule::new(300, [17, 450]);
        assert!(!schedule.is_due(0));
        assert!(schedule.is_due(300));
        assert!(schedule.is_due(17));
        assert!(schedule.is_audit(450));
        assert!(!schedule.is_audit(300));
        assert!(!schedule.is_due(301));
    }
}
