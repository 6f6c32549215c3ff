//! Bastion Wire Protocol Types
//!
//! This crate defines the shared Protobuf message types exchanged between the
//! game client and the Server Edge. Both sides MUST depend on this crate so a
//! schema change is a compile-time break rather than a silent mismatch.
//!
//! # Message Categories
//!
//! - **Session**: start, signed token, end with partial rewards
//! - **Segment**: submission (events, checkpoints, final hash) and result
//! - **Snapshots**: config, inventory and progression carried inside the above
//!
//! Enumerated game content (classes, heroes, relics, ...) travels as its
//! stable `u32` id. Q16.16 values travel as their raw `i32` bits.

#![deny(unsafe_code)]

use std::collections::BTreeMap;

use prost::Message;
use thiserror::Error;

use bastion_sim::config::{SimConfig, StatBonuses, TurretPlacement};
use bastion_sim::content::{
    ArtifactKind, FortressClass, HeroKind, MaterialKind, Pillar, RelicKind, TurretKind,
};
use bastion_sim::{Checkpoint, GameEvent, TimedEvent};

// ============================================================================
// Type Aliases (matching simulation crate)
// ============================================================================

/// Tick type alias for wire protocol.
pub type Tick = u64;

// ============================================================================
// Session Messages
// ============================================================================

/// Client request to open a session with its chosen loadout.
#[derive(Clone, PartialEq, Message)]
pub struct StartSessionRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,

    #[prost(uint32, tag = "2")]
    pub fortress_class: u32,

    /// Hero ids, in lane assignment order.
    #[prost(uint32, repeated, tag = "3")]
    pub heroes: Vec<u32>,

    #[prost(message, repeated, tag = "4")]
    pub turrets: Vec<TurretPlacementProto>,

    #[prost(uint32, repeated, tag = "5")]
    pub equipped_artifacts: Vec<u32>,
}

/// Everything the server binds to a segment. Signed as a whole.
#[derive(Clone, PartialEq, Message)]
pub struct SessionTokenPayload {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(string, tag = "2")]
    pub user_id: String,

    /// Seed for this segment's simulation.
    #[prost(uint32, tag = "3")]
    pub seed: u32,

    #[prost(string, tag = "4")]
    pub sim_version: String,

    /// Last verified wave; the segment starts after it.
    #[prost(uint32, tag = "5")]
    pub start_wave: u32,

    /// Ticks at which the client MUST record a checkpoint.
    #[prost(uint64, repeated, tag = "6")]
    pub audit_ticks: Vec<Tick>,

    #[prost(message, optional, tag = "7")]
    pub sim_config: Option<SimConfigProto>,

    #[prost(uint64, tag = "8")]
    pub issued_at_ms: u64,

    #[prost(uint64, tag = "9")]
    pub expires_at_ms: u64,
}

/// Opaque token as handed to the client: encoded payload plus HMAC-SHA256.
#[derive(Clone, PartialEq, Message)]
pub struct SignedSessionToken {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartSessionResponse {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(message, optional, tag = "2")]
    pub token: Option<SignedSessionToken>,

    #[prost(message, optional, tag = "3")]
    pub inventory: Option<InventoryProto>,

    #[prost(message, optional, tag = "4")]
    pub progression: Option<ProgressionProto>,
}

/// Client-claimed rewards for an unverified tail of a session.
#[derive(Clone, PartialEq, Message)]
pub struct PartialRewardsProto {
    #[prost(uint64, tag = "1")]
    pub gold: u64,

    #[prost(uint64, tag = "2")]
    pub dust: u64,

    #[prost(uint64, tag = "3")]
    pub xp: u64,

    #[prost(uint32, tag = "4")]
    pub final_wave: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EndSessionRequest {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(message, optional, tag = "2")]
    pub token: Option<SignedSessionToken>,

    #[prost(message, optional, tag = "3")]
    pub partial_rewards: Option<PartialRewardsProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EndSessionResult {
    /// Empty on success.
    #[prost(string, tag = "1")]
    pub reject_reason: String,

    /// Partial rewards actually credited after sanitising.
    #[prost(message, optional, tag = "2")]
    pub credited: Option<PartialRewardsProto>,

    #[prost(uint32, tag = "3")]
    pub final_wave: u32,

    #[prost(message, optional, tag = "4")]
    pub new_inventory: Option<InventoryProto>,

    #[prost(message, optional, tag = "5")]
    pub new_progression: Option<ProgressionProto>,
}

// ============================================================================
// Segment Messages
// ============================================================================

/// A player event scheduled for a tick.
///
/// `kind` selects which of the payload fields are meaningful; see
/// [`GameEvent::kind`].
#[derive(Clone, PartialEq, Message)]
pub struct GameEventProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    #[prost(uint32, tag = "2")]
    pub kind: u32,

    #[prost(uint32, tag = "3")]
    pub relic_index: u32,

    #[prost(uint32, tag = "4")]
    pub hero_id: u32,

    #[prost(uint32, tag = "5")]
    pub lane: u32,

    /// Wall position, raw Q16.16.
    #[prost(int32, tag = "6")]
    pub x: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CheckpointProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    #[prost(uint64, tag = "2")]
    pub state_hash: u64,

    #[prost(uint64, tag = "3")]
    pub chain_hash: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SegmentSubmission {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(message, optional, tag = "2")]
    pub token: Option<SignedSessionToken>,

    #[prost(uint32, tag = "3")]
    pub start_wave: u32,

    #[prost(uint32, tag = "4")]
    pub end_wave: u32,

    /// Ordered by tick, then submission order.
    #[prost(message, repeated, tag = "5")]
    pub events: Vec<GameEventProto>,

    /// Ordered by tick ascending.
    #[prost(message, repeated, tag = "6")]
    pub checkpoints: Vec<CheckpointProto>,

    #[prost(uint64, tag = "7")]
    pub final_hash: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SegmentResult {
    #[prost(bool, tag = "1")]
    pub verified: bool,

    /// Stable reject code; empty when verified.
    #[prost(string, tag = "2")]
    pub reject_reason: String,

    /// Human-readable detail for logs; never parsed.
    #[prost(string, tag = "3")]
    pub reject_detail: String,

    #[prost(uint32, tag = "4")]
    pub end_wave: u32,

    #[prost(uint64, tag = "5")]
    pub gold_earned: u64,

    #[prost(uint64, tag = "6")]
    pub dust_earned: u64,

    #[prost(uint64, tag = "7")]
    pub xp_earned: u64,

    #[prost(message, repeated, tag = "8")]
    pub materials_earned: Vec<MaterialCountProto>,

    #[prost(uint32, repeated, tag = "9")]
    pub artifacts_earned: Vec<u32>,

    #[prost(uint64, repeated, tag = "10")]
    pub next_segment_audit_ticks: Vec<Tick>,

    #[prost(message, optional, tag = "11")]
    pub next_token: Option<SignedSessionToken>,

    #[prost(message, optional, tag = "12")]
    pub new_inventory: Option<InventoryProto>,

    #[prost(message, optional, tag = "13")]
    pub new_progression: Option<ProgressionProto>,
}

// ============================================================================
// Snapshot Messages
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct TurretPlacementProto {
    #[prost(uint32, tag = "1")]
    pub kind: u32,

    #[prost(uint32, tag = "2")]
    pub slot: u32,
}

/// Config snapshot a segment is simulated under. Q16.16 fields are raw bits.
#[derive(Clone, PartialEq, Message)]
pub struct SimConfigProto {
    #[prost(uint32, tag = "1")]
    pub tick_rate_hz: u32,

    #[prost(uint32, tag = "2")]
    pub segment_size: u32,

    #[prost(uint32, tag = "3")]
    pub fortress_class: u32,

    #[prost(int32, tag = "4")]
    pub fortress_base_hp: i32,

    #[prost(int32, tag = "5")]
    pub fortress_base_damage: i32,

    #[prost(uint32, tag = "6")]
    pub fortress_attack_interval: u32,

    #[prost(uint32, tag = "7")]
    pub wave_interval: u32,

    #[prost(uint32, tag = "8")]
    pub checkpoint_interval: u32,

    #[prost(uint32, tag = "9")]
    pub commander_level: u32,

    #[prost(uint32, repeated, tag = "10")]
    pub unlocked_heroes: Vec<u32>,

    #[prost(uint32, repeated, tag = "11")]
    pub unlocked_turrets: Vec<u32>,

    #[prost(uint32, repeated, tag = "12")]
    pub unlocked_pillars: Vec<u32>,

    #[prost(uint32, repeated, tag = "13")]
    pub heroes: Vec<u32>,

    #[prost(message, repeated, tag = "14")]
    pub turrets: Vec<TurretPlacementProto>,

    #[prost(int32, tag = "15")]
    pub bonus_damage: i32,

    #[prost(int32, tag = "16")]
    pub bonus_max_hp: i32,

    #[prost(int32, tag = "17")]
    pub bonus_gold: i32,

    #[prost(int32, tag = "18")]
    pub bonus_xp: i32,

    #[prost(uint32, repeated, tag = "19")]
    pub equipped_artifacts: Vec<u32>,

    #[prost(uint32, repeated, tag = "20")]
    pub starting_relics: Vec<u32>,

    #[prost(uint32, tag = "21")]
    pub start_wave: u32,

    #[prost(bool, tag = "22")]
    pub endless: bool,

    #[prost(uint32, tag = "23")]
    pub max_waves: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MaterialCountProto {
    #[prost(uint32, tag = "1")]
    pub material: u32,

    #[prost(uint32, tag = "2")]
    pub amount: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct InventoryProto {
    #[prost(uint64, tag = "1")]
    pub gold: u64,

    #[prost(uint64, tag = "2")]
    pub dust: u64,

    /// Ordered by material id ascending.
    #[prost(message, repeated, tag = "3")]
    pub materials: Vec<MaterialCountProto>,

    #[prost(uint32, repeated, tag = "4")]
    pub artifacts: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProgressionProto {
    #[prost(uint64, tag = "1")]
    pub total_xp: u64,

    #[prost(uint32, tag = "2")]
    pub commander_level: u32,

    #[prost(uint32, tag = "3")]
    pub highest_wave: u32,
}

// ============================================================================
// Conversions
// ============================================================================

/// A wire message that doesn't map onto a simulation type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unknown {what} id {id}")]
    UnknownId { what: &'static str, id: u32 },

    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("missing field {0}")]
    MissingField(&'static str),
}

fn decode_id<T>(
    id: u32,
    what: &'static str,
    from_id: fn(u32) -> Option<T>,
) -> Result<T, ConversionError> {
    from_id(id).ok_or(ConversionError::UnknownId { what, id })
}

fn decode_ids<T>(
    ids: &[u32],
    what: &'static str,
    from_id: fn(u32) -> Option<T>,
) -> Result<Vec<T>, ConversionError> {
    ids.iter().map(|&id| decode_id(id, what, from_id)).collect()
}

fn narrow_u8(value: u32, field: &'static str) -> Result<u8, ConversionError> {
    u8::try_from(value).map_err(|_| ConversionError::OutOfRange {
        field,
        value: u64::from(value),
    })
}

impl From<&TurretPlacement> for TurretPlacementProto {
    fn from(p: &TurretPlacement) -> Self {
        Self {
            kind: p.kind.id(),
            slot: u32::from(p.slot),
        }
    }
}

impl TryFrom<&TurretPlacementProto> for TurretPlacement {
    type Error = ConversionError;

    fn try_from(p: &TurretPlacementProto) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: decode_id(p.kind, "turret", TurretKind::from_id)?,
            slot: narrow_u8(p.slot, "turret slot")?,
        })
    }
}

impl From<&SimConfig> for SimConfigProto {
    fn from(c: &SimConfig) -> Self {
        Self {
            tick_rate_hz: c.tick_rate_hz,
            segment_size: c.segment_size,
            fortress_class: c.fortress_class.id(),
            fortress_base_hp: c.fortress_base_hp,
            fortress_base_damage: c.fortress_base_damage,
            fortress_attack_interval: c.fortress_attack_interval,
            wave_interval: c.wave_interval,
            checkpoint_interval: c.checkpoint_interval,
            commander_level: c.commander_level,
            unlocked_heroes: c.unlocked_heroes.iter().map(|h| h.id()).collect(),
            unlocked_turrets: c.unlocked_turrets.iter().map(|t| t.id()).collect(),
            unlocked_pillars: c.unlocked_pillars.iter().map(|p| p.id()).collect(),
            heroes: c.heroes.iter().map(|h| h.id()).collect(),
            turrets: c.turrets.iter().map(Into::into).collect(),
            bonus_damage: c.stat_bonuses.damage,
            bonus_max_hp: c.stat_bonuses.max_hp,
            bonus_gold: c.stat_bonuses.gold,
            bonus_xp: c.stat_bonuses.xp,
            equipped_artifacts: c.equipped_artifacts.iter().map(|a| a.id()).collect(),
            starting_relics: c.starting_relics.iter().map(|r| r.id()).collect(),
            start_wave: c.start_wave,
            endless: c.endless,
            max_waves: c.max_waves,
        }
    }
}

impl TryFrom<&SimConfigProto> for SimConfig {
    type Error = ConversionError;

    /// Decodes ids only; call [`SimConfig::validate`] for consistency checks.
    fn try_from(p: &SimConfigProto) -> Result<Self, Self::Error> {
        Ok(Self {
            tick_rate_hz: p.tick_rate_hz,
            segment_size: p.segment_size,
            fortress_class: decode_id(p.fortress_class, "fortress class", FortressClass::from_id)?,
            fortress_base_hp: p.fortress_base_hp,
            fortress_base_damage: p.fortress_base_damage,
            fortress_attack_interval: p.fortress_attack_interval,
            wave_interval: p.wave_interval,
            checkpoint_interval: p.checkpoint_interval,
            commander_level: p.commander_level,
            unlocked_heroes: decode_ids(&p.unlocked_heroes, "hero", HeroKind::from_id)?,
            unlocked_turrets: decode_ids(&p.unlocked_turrets, "turret", TurretKind::from_id)?,
            unlocked_pillars: decode_ids(&p.unlocked_pillars, "pillar", Pillar::from_id)?,
            heroes: decode_ids(&p.heroes, "hero", HeroKind::from_id)?,
            turrets: p
                .turrets
                .iter()
                .map(TurretPlacement::try_from)
                .collect::<Result<_, _>>()?,
            stat_bonuses: StatBonuses {
                damage: p.bonus_damage,
                max_hp: p.bonus_max_hp,
                gold: p.bonus_gold,
                xp: p.bonus_xp,
            },
            equipped_artifacts: decode_ids(
                &p.equipped_artifacts,
                "artifact",
                ArtifactKind::from_id,
            )?,
            starting_relics: decode_ids(&p.starting_relics, "relic", RelicKind::from_id)?,
            start_wave: p.start_wave,
            endless: p.endless,
            max_waves: p.max_waves,
        })
    }
}

impl From<&TimedEvent> for GameEventProto {
    fn from(timed: &TimedEvent) -> Self {
        let mut proto = Self {
            tick: timed.tick,
            kind: timed.event.kind(),
            relic_index: 0,
            hero_id: 0,
            lane: 0,
            x: 0,
        };
        match timed.event {
            GameEvent::ChooseRelic { index } => proto.relic_index = u32::from(index),
            GameEvent::ActivateHeroSkill { hero_id } => proto.hero_id = hero_id,
            GameEvent::PlaceWall { lane, x } => {
                proto.lane = u32::from(lane);
                proto.x = x;
            }
            GameEvent::DeployMilitia { lane } => proto.lane = u32::from(lane),
            GameEvent::RerollRelics | GameEvent::Retry => {}
        }
        proto
    }
}

impl TryFrom<&GameEventProto> for TimedEvent {
    type Error = ConversionError;

    /// Decodes the payload for `kind`. Range checks against game rules are
    /// left to [`GameEvent::validate`].
    fn try_from(p: &GameEventProto) -> Result<Self, Self::Error> {
        let event = match p.kind {
            0 => GameEvent::ChooseRelic {
                index: narrow_u8(p.relic_index, "relic_index")?,
            },
            1 => GameEvent::RerollRelics,
            2 => GameEvent::ActivateHeroSkill { hero_id: p.hero_id },
            3 => GameEvent::PlaceWall {
                lane: narrow_u8(p.lane, "lane")?,
                x: p.x,
            },
            4 => GameEvent::DeployMilitia {
                lane: narrow_u8(p.lane, "lane")?,
            },
            5 => GameEvent::Retry,
            id => {
                return Err(ConversionError::UnknownId {
                    what: "event kind",
                    id,
                });
            }
        };
        Ok(Self {
            tick: p.tick,
            event,
        })
    }
}

impl From<&Checkpoint> for CheckpointProto {
    fn from(c: &Checkpoint) -> Self {
        Self {
            tick: c.tick,
            state_hash: c.state_hash,
            chain_hash: c.chain_hash,
        }
    }
}

impl From<&CheckpointProto> for Checkpoint {
    fn from(p: &CheckpointProto) -> Self {
        Self {
            tick: p.tick,
            state_hash: p.state_hash,
            chain_hash: p.chain_hash,
        }
    }
}

/// Materials in id order.
pub fn materials_to_proto(materials: &BTreeMap<MaterialKind, u32>) -> Vec<MaterialCountProto> {
    materials
        .iter()
        .map(|(material, &amount)| MaterialCountProto {
            material: material.id(),
            amount,
        })
        .collect()
}

pub fn materials_from_proto(
    materials: &[MaterialCountProto],
) -> Result<BTreeMap<MaterialKind, u32>, ConversionError> {
    let mut out = BTreeMap::new();
    for m in materials {
        let kind = decode_id(m.material, "material", MaterialKind::from_id)?;
        *out.entry(kind).or_insert(0) += m.amount;
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
