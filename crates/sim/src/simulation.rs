//! The simulation state machine.
//!
//! `Simulation` owns a `GameState`, the RNG, the event queue and the
//! checkpoint chain. `step()` advances exactly one tick in a fixed order:
//!
//! 1. apply due events (tick order, then submission order)
//! 2. checkpoint if the tick is scheduled or audited
//! 3. recompute modifiers (pillar modifiers on a slower cadence)
//! 4. wave flow: completion, countdown, spawning
//! 5. entity updates: statuses, enemy movement, specials, heroes, turrets,
//!    fortress, projectiles, militia, regen, then cleanup
//! 6. loss check, persist RNG state, advance the tick
//!
//! While a relic choice is open only step 1 runs; the tick still advances.

use std::collections::BTreeMap;

use tracing::trace;

use crate::Tick;
use crate::checkpoint::{self, Checkpoint, CheckpointChain, CheckpointSchedule};
use crate::config::{ConfigError, SimConfig};
use crate::content::{
    ArtifactKind, HeroKind, LANE_COUNT, MILITIA_COST, MaterialKind, Pillar, RELIC_CHOICES,
    REROLL_COST, RelicKind, HERO_X, WALL_COST, lane_y, turret_slot_position,
};
use crate::events::{EventError, EventQueue, GameEvent, TimedEvent};
use crate::fixed::FpVec2;
use crate::modifiers::{
    ModifierInputs, PILLAR_REFRESH_TICKS, SynergyModifiers, resolve_modifiers, resolve_pillar,
    resolve_synergy,
};
use crate::rng::Xorshift32;
use crate::state::{
    AbilityTable, GameState, Hero, IdCounters, Phase, RelicChoice, SessionStats, Turret,
};
use crate::{combat, enemies, projectiles, units, waves};

// ============================================================================
// Relic Draft
// ============================================================================

/// Proposes relic options when a choice window opens or is rerolled.
///
/// Implementations must draw only from `rng` so client and server agree.
pub trait RelicDraft {
    fn draw(&mut self, owned: &[RelicKind], rng: &mut Xorshift32) -> Vec<RelicKind>;
}

/// Three distinct relics the player doesn't own yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRelicDraft;

impl RelicDraft for StandardRelicDraft {
    fn draw(&mut self, owned: &[RelicKind], rng: &mut Xorshift32) -> Vec<RelicKind> {
        let pool: Vec<RelicKind> = RelicKind::ALL
            .into_iter()
            .filter(|r| !owned.contains(r))
            .collect();
        rng.pick_n(&pool, RELIC_CHOICES)
    }
}

// ============================================================================
// Segment Rewards
// ============================================================================

/// Rewards accumulated by the current segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentRewards {
    pub gold: u64,
    pub dust: u64,
    pub xp: u64,
    pub materials: BTreeMap<MaterialKind, u32>,
    pub artifacts: Vec<ArtifactKind>,
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    state: GameState,
    rng: Xorshift32,
    events: EventQueue,
    schedule: CheckpointSchedule,
    chain: CheckpointChain,
}

impl Simulation {
    /// Build a simulation at tick 0 for the segment starting after
    /// `config.start_wave`.
    pub fn new(seed: u32, config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = Xorshift32::new(seed);
        let state = initial_state(&config, rng.state());
        let mut sim = Self {
            schedule: CheckpointSchedule::new(config.checkpoint_interval, []),
            config,
            state,
            rng,
            events: EventQueue::new(),
            chain: CheckpointChain::new(),
        };
        sim.refresh_modifiers();
        sim.state.fortress_hp = sim.state.fortress_max_hp;
        Ok(sim)
    }

    /// Ticks at which a checkpoint is mandatory, in addition to the
    /// regular cadence.
    pub fn set_audit_ticks(&mut self, ticks: impl IntoIterator<Item = Tick>) {
        self.schedule = CheckpointSchedule::new(self.config.checkpoint_interval, ticks);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        self.chain.checkpoints()
    }

    pub fn schedule(&self) -> &CheckpointSchedule {
        &self.schedule
    }

    pub fn state_hash(&self) -> u64 {
        checkpoint::state_hash(&self.state)
    }

    pub fn final_hash(&self) -> u64 {
        checkpoint::final_hash(&self.state)
    }

    pub fn pending_events(&self) -> &EventQueue {
        &self.events
    }

    /// Schedule `event` for `tick`. Events for past ticks are refused.
    pub fn queue_event(&mut self, tick: Tick, event: GameEvent) -> Result<(), EventError> {
        event.validate()?;
        if tick < self.state.tick {
            return Err(EventError::InPast {
                event_tick: tick,
                current_tick: self.state.tick,
            });
        }
        self.events.push(TimedEvent { tick, event });
        Ok(())
    }

    /// Ended with no retry pending: further steps change nothing.
    pub fn is_halted(&self) -> bool {
        self.state.is_ended() && !self.events.has_pending(|e| matches!(e, GameEvent::Retry))
    }

    /// The segment's target wave has been cleared.
    pub fn segment_complete(&self) -> bool {
        self.state.cleared_wave() >= self.config.target_wave()
    }

    /// Stop condition shared by client and verifier.
    pub fn should_stop(&self) -> bool {
        self.segment_complete() || self.is_halted()
    }

    pub fn rewards(&self) -> SegmentRewards {
        SegmentRewards {
            gold: self.state.segment_gold_earned,
            dust: self.state.segment_dust_earned,
            xp: self.state.segment_xp_earned,
            materials: self.state.segment_materials_earned.clone(),
            artifacts: self.state.segment_artifacts_earned.clone(),
        }
    }

    pub fn step(&mut self) {
        self.step_with(&mut StandardRelicDraft);
    }

    /// Advance one tick, drawing relic options from `draft`.
    pub fn step_with(&mut self, draft: &mut dyn RelicDraft) {
        if self.state.phase == Phase::NotStarted {
            self.state.phase = Phase::Running;
        }
        let tick = self.state.tick;

        for event in self.events.drain_due(tick) {
            self.apply_event(event, draft);
        }

        if self.schedule.is_due(tick) {
            self.chain.record(&self.state);
        }

        if !self.state.is_ended() {
            self.refresh_modifiers();
            if tick % PILLAR_REFRESH_TICKS == 0 {
                self.state.pillar_modifiers =
                    resolve_pillar(self.state.pillar, self.state.wave.max(1));
            }

            if !self.state.is_paused() {
                self.advance_gameplay(draft);
            }

            if self.state.fortress_hp <= 0 && self.state.phase == Phase::Running {
                self.state.fortress_hp = 0;
                self.state.phase = Phase::Lost;
                trace!(tick, wave = self.state.wave, "fortress destroyed");
            }
        }

        self.state.rng_state = self.rng.state();
        self.state.tick += 1;
    }

    // ========================================================================
    // Internal Methods
    // ========================================================================

    fn advance_gameplay(&mut self, draft: &mut dyn RelicDraft) {
        let state = &mut self.state;
        let rng = &mut self.rng;
        let config = &self.config;

        if waves::is_wave_complete(state) {
            waves::complete_wave(state, config, rng);
            self.chain.record(state);
            if !state.is_ended() {
                let options = draft.draw(&state.relics, rng);
                if !options.is_empty() {
                    state.relic_choice = Some(RelicChoice {
                        options,
                        rerolls: 0,
                    });
                }
            }
            return;
        }

        if !state.wave_active {
            if state.wave_countdown > 0 {
                state.wave_countdown -= 1;
            } else {
                waves::start_next_wave(state, config, rng);
            }
        } else {
            waves::spawn_due(state);
        }

        combat::tick_statuses(state);
        enemies::update_movement(state, rng);
        enemies::update_specials(state, rng);
        units::update_heroes(state, rng);
        units::update_turrets(state);
        units::fortress_attack(
            state,
            config.fortress_base_damage,
            config.fortress_attack_interval,
        );
        projectiles::update_projectiles(state, rng);
        units::update_militia(state);
        units::fortress_regen(state);
        cleanup(state);
    }

    fn apply_event(&mut self, event: GameEvent, draft: &mut dyn RelicDraft) {
        let state = &mut self.state;
        match event {
            GameEvent::ChooseRelic { index } => {
                let chosen = state
                    .relic_choice
                    .as_ref()
                    .and_then(|c| c.options.get(usize::from(index)).copied());
                if let Some(relic) = chosen {
                    state.relics.push(relic);
                    state.relic_choice = None;
                }
            }
            GameEvent::RerollRelics => {
                if state.relic_choice.is_none() || state.wallet_gold < REROLL_COST {
                    return;
                }
                state.wallet_gold -= REROLL_COST;
                let options = draft.draw(&state.relics, &mut self.rng);
                match state.relic_choice.as_mut() {
                    Some(choice) if !options.is_empty() => {
                        choice.options = options;
                        choice.rerolls += 1;
                    }
                    _ => state.relic_choice = None,
                }
            }
            GameEvent::ActivateHeroSkill { hero_id } => {
                if !state.is_ended() && !state.is_paused() {
                    units::activate_skill(state, &mut self.rng, hero_id);
                }
            }
            GameEvent::PlaceWall { lane, x } => {
                if !state.is_ended() && state.wallet_gold >= WALL_COST {
                    state.wallet_gold -= WALL_COST;
                    units::place_wall(state, lane, x);
                }
            }
            GameEvent::DeployMilitia { lane } => {
                if !state.is_ended() && state.wallet_gold >= MILITIA_COST {
                    state.wallet_gold -= MILITIA_COST;
                    units::deploy_militia(state, lane);
                }
            }
            GameEvent::Retry => self.retry(),
        }
    }

    /// Endless mode only: resume after a loss and replay the lost wave.
    /// Wallet, relics, XP and reward accumulators carry over.
    fn retry(&mut self) {
        if self.state.phase != Phase::Lost || !self.config.endless {
            return;
        }
        let state = &mut self.state;
        state.fortress_hp = state.fortress_max_hp;
        state.enemies.clear();
        state.projectiles.clear();
        state.spawn_queue.clear();
        state.militia.clear();
        state.abilities.clear();
        state.relic_choice = None;
        for hero in state.heroes.iter_mut() {
            hero.hp = hero.max_hp;
        }
        state.wave = state.wave.saturating_sub(1);
        state.wave_active = false;
        state.wave_countdown = self.config.wave_interval;
        state.stats.retries += 1;
        state.phase = Phase::Running;
        trace!(wave = state.wave, retries = state.stats.retries, "retry");
    }

    /// Synergy and combined modifiers from the current roster. Max HP
    /// increases also heal by the same amount.
    fn refresh_modifiers(&mut self) {
        let state = &mut self.state;
        let synergy: SynergyModifiers =
            resolve_synergy(state.fortress_class, &state.heroes, &state.turrets);
        let modifiers = resolve_modifiers(&ModifierInputs {
            class: state.fortress_class,
            heroes: &state.heroes,
            turrets: &state.turrets,
            relics: &state.relics,
            artifacts: &self.config.equipped_artifacts,
            stat_bonuses: self.config.stat_bonuses,
            synergy: &synergy,
            pillar: &state.pillar_modifiers,
        });
        state.synergy_modifiers = synergy;
        state.modifiers = modifiers;

        let max_hp = self.config.fortress_max_hp(modifiers.max_hp_bonus);
        if max_hp > state.fortress_max_hp {
            state.fortress_hp = state.fortress_hp.saturating_add(max_hp - state.fortress_max_hp);
        }
        state.fortress_max_hp = max_hp;
        state.fortress_hp = state.fortress_hp.min(max_hp);
    }
}

/// Pay out and remove dead enemies, drop broken walls and spent militia,
/// prune the ability table.
fn cleanup(state: &mut GameState) {
    let mut payouts = Vec::new();
    for enemy in state.enemies.iter().filter(|e| !e.is_alive()) {
        let gold = enemy.kind.stats().gold;
        let boss = enemy.kind.is_boss();
        payouts.push((if enemy.elite { gold * 2 } else { gold }, enemy.elite, boss));
    }
    for (gold, elite, boss) in payouts {
        state.earn_gold(gold);
        state.stats.kills += 1;
        if elite {
            state.stats.elite_kills += 1;
            state.segment_dust_earned += 1;
        }
        if boss {
            state.stats.boss_kills += 1;
            state.segment_dust_earned += 10;
        }
    }
    state.enemies.retain(|e| e.is_alive());
    state.walls.retain(|w| w.hp > 0);
    state.militia.retain(|m| m.hp > 0 && m.remaining > 0);
    let live = state.live_enemy_ids();
    state.abilities.retain_live(&live);
}

fn initial_state(config: &SimConfig, rng_state: u32) -> GameState {
    let mut ids = IdCounters::default();
    let heroes = config
        .heroes
        .iter()
        .enumerate()
        .map(|(i, kind)| spawn_hero(&mut ids, *kind, (i % usize::from(LANE_COUNT)) as u8))
        .collect();
    let turrets = config
        .turrets
        .iter()
        .map(|placement| {
            let stats = placement.kind.stats();
            let (x, y) = turret_slot_position(placement.slot);
            Turret {
                id: ids.next_turret(),
                kind: placement.kind,
                slot: placement.slot,
                pos: FpVec2::new(x, y),
                hp: stats.max_hp,
                max_hp: stats.max_hp,
                attack_cooldown: 0,
            }
        })
        .collect();
    let first_wave = config.start_wave + 1;
    let pillar = Pillar::for_wave(first_wave, &config.unlocked_pillars);

    GameState {
        tick: 0,
        wave: config.start_wave,
        phase: Phase::NotStarted,
        rng_state,
        fortress_class: config.fortress_class,
        fortress_hp: config.fortress_base_hp,
        fortress_max_hp: config.fortress_base_hp,
        fortress_attack_cooldown: 0,
        enemies: Vec::new(),
        heroes,
        turrets,
        projectiles: Vec::new(),
        walls: Vec::new(),
        militia: Vec::new(),
        ids,
        abilities: AbilityTable::default(),
        relics: config.starting_relics.clone(),
        pillar,
        modifiers: Default::default(),
        synergy_modifiers: Default::default(),
        pillar_modifiers: resolve_pillar(pillar, first_wave),
        wave_active: false,
        spawn_queue: Default::default(),
        spawn_cooldown: 0,
        wave_countdown: config.wave_interval,
        relic_choice: None,
        wallet_gold: 0,
        segment_gold_earned: 0,
        segment_dust_earned: 0,
        segment_xp_earned: 0,
        segment_materials_earned: BTreeMap::new(),
        segment_artifacts_earned: Vec::new(),
        stats: SessionStats::default(),
    }
}

fn spawn_hero(ids: &mut IdCounters, kind: HeroKind, lane: u8) -> Hero {
    let stats = kind.stats();
    Hero {
        id: ids.next_hero(),
        kind,
        lane,
        pos: FpVec2::new(HERO_X, lane_y(lane)),
        hp: stats.max_hp,
        max_hp: stats.max_hp,
        attack_cooldown: 0,
        skill_cooldown: 0,
    }
}

// ============================================================================
// Tests
// ============================================================================
