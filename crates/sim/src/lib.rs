//! Bastion Simulation Core
//!
//! This crate contains the deterministic, fixed-timestep wave-defense
//! simulation. It is the authoritative source of truth for every value that
//! affects rewards: the client runs it to play, the server replays it to
//! verify.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//! - Use floating point in any state-affecting path
//! - Iterate hash-ordered collections
//!
//! Gameplay arithmetic is Q16.16 fixed point ([`fixed`]); randomness comes
//! from a single seeded xorshift32 stream ([`rng`]). Two runs with the same
//! seed, config and event list produce bit-identical state at every tick.
//!
//! # Layout
//!
//! - [`simulation`]: the per-tick state machine and its public API
//! - [`state`]: the `GameState` aggregate and entity types
//! - [`modifiers`]: synergy, pillar and combined modifier resolution
//! - [`combat`], [`waves`], [`enemies`], [`units`], [`projectiles`]: tick systems
//! - [`events`]: player events and the ordered event queue
//! - [`checkpoint`]: state hashing and the checkpoint hash chain

#![deny(unsafe_code)]

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep; the atomic unit of game time.
pub type Tick = u64;

/// Ruleset identifier. Bump on any change that alters simulation output;
/// segments recorded under another version are not verifiable.
pub const SIM_VERSION: &str = "bastion-sim-1";

// ============================================================================
// Modules
// ============================================================================

pub mod checkpoint;
pub mod combat;
pub mod config;
pub mod content;
pub mod enemies;
pub mod events;
pub mod fixed;
pub mod modifiers;
pub mod projectiles;
pub mod rng;
pub mod simulation;
pub mod state;
pub mod units;
pub mod waves;

pub use checkpoint::{
    Checkpoint, CheckpointChain, CheckpointSchedule, GENESIS_CHAIN_HASH, STATE_HASH_ALGO_ID,
    chain_hash, final_hash, state_hash, verify_chain,
};
pub use config::{ConfigError, SimConfig, StatBonuses, TurretPlacement};
pub use events::{EventError, EventQueue, GameEvent, TimedEvent, validate_event_list};
pub use fixed::{Fp, FpVec2};
pub use rng::{Xorshift32, derive_segment_seed};
pub use simulation::{RelicDraft, SegmentRewards, Simulation, StandardRelicDraft};
pub use state::{EntityId, GameState, Phase};
