//! Session setup: loadout decoding and per-segment config snapshots.

use bastion_sim::config::{SimConfig, StatBonuses, TurretPlacement};
use bastion_sim::content::{ArtifactKind, FortressClass, HeroKind, RelicKind};
use bastion_wire::{ConversionError, StartSessionRequest};
use rand::Rng;

use crate::ServerConfig;
use crate::providers::{BalanceConfig, GuildBonus};
use crate::store::{Loadout, Profile};

/// Session identifier (server-issued, opaque to clients).
pub type SessionId = String;

pub fn new_session_id<R: Rng + ?Sized>(rng: &mut R) -> SessionId {
    format!("{:032x}", rng.random::<u128>())
}

/// Decode the loadout a client asked for. Unlock checks happen later in
/// `SimConfig::validate`.
pub fn decode_loadout(request: &StartSessionRequest) -> Result<Loadout, ConversionError> {
    let fortress_class = FortressClass::from_id(request.fortress_class).ok_or(
        ConversionError::UnknownId {
            what: "fortress class",
            id: request.fortress_class,
        },
    )?;
    let heroes = request
        .heroes
        .iter()
        .map(|&id| HeroKind::from_id(id).ok_or(ConversionError::UnknownId { what: "hero", id }))
        .collect::<Result<_, _>>()?;
    let turrets = request
        .turrets
        .iter()
        .map(TurretPlacement::try_from)
        .collect::<Result<_, _>>()?;
    let equipped_artifacts = request
        .equipped_artifacts
        .iter()
        .map(|&id| {
            ArtifactKind::from_id(id).ok_or(ConversionError::UnknownId {
                what: "artifact",
                id,
            })
        })
        .collect::<Result<_, _>>()?;
    Ok(Loadout {
        fortress_class,
        heroes,
        turrets,
        equipped_artifacts,
    })
}

/// Config snapshot for a session's first segment.
pub fn initial_sim_config(
    server: &ServerConfig,
    profile: &Profile,
    loadout: &Loadout,
    balance: BalanceConfig,
    guild: &GuildBonus,
) -> SimConfig {
    let commander_level = profile.progression.commander_level;
    SimConfig {
        tick_rate_hz: server.tick_rate_hz,
        segment_size: server.segment_size,
        fortress_class: loadout.fortress_class,
        fortress_base_hp: balance.fortress_base_hp,
        fortress_base_damage: balance.fortress_base_damage,
        wave_interval: balance.wave_interval,
        checkpoint_interval: server.checkpoint_interval,
        commander_level,
        unlocked_heroes: profile.unlocked_heroes.clone(),
        unlocked_turrets: profile.unlocked_turrets.clone(),
        unlocked_pillars: profile.unlocked_pillars.clone(),
        heroes: loadout.heroes.clone(),
        turrets: loadout.turrets.clone(),
        stat_bonuses: StatBonuses::for_commander_level(commander_level).combine(guild.stat_boosts),
        equipped_artifacts: loadout.equipped_artifacts.clone(),
        starting_relics: Vec::new(),
        start_wave: 0,
        endless: server.endless,
        max_waves: server.max_waves,
        ..Default::default()
    }
}

/// The same snapshot rebased for the segment after `end_wave`.
pub fn next_sim_config(previous: &SimConfig, end_wave: u32, relics: &[RelicKind]) -> SimConfig {
    SimConfig {
        start_wave: end_wave,
        starting_relics: relics.to_vec(),
        ..previous.clone()
    }
}
