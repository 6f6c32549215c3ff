//! Reward arithmetic on the server side of a segment.
//!
//! Gold and XP are scaled by the active event multiplier and the guild bonus
//! and floored; dust, materials and artifacts are credited as replayed.
//! Multipliers are Q16.16 so crediting is exact and reproducible.

use bastion_sim::SegmentRewards;
use bastion_sim::fixed::{Fp, ONE, mul};

use crate::providers::{EventMultipliers, GuildBonus};
use crate::store::{SegmentCommit, SessionEndCommit};

/// `floor(amount * factor)`; negative factors credit nothing.
pub fn apply_multiplier(amount: u64, factor: Fp) -> u64 {
    let scaled = (u128::from(amount) * factor.max(0) as u128) >> 16;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Combined gold and XP factors for a user at a moment.
pub fn reward_factors(event: EventMultipliers, guild: &GuildBonus) -> (Fp, Fp) {
    (
        mul(event.gold, ONE.saturating_add(guild.gold_bonus)),
        mul(event.xp, ONE.saturating_add(guild.xp_bonus)),
    )
}

/// Turn a verified segment's rewards into the delta to persist.
pub fn segment_commit(
    rewards: &SegmentRewards,
    event: EventMultipliers,
    guild: &GuildBonus,
) -> SegmentCommit {
    let (gold_factor, xp_factor) = reward_factors(event, guild);
    SegmentCommit {
        gold: apply_multiplier(rewards.gold, gold_factor),
        dust: rewards.dust,
        xp: apply_multiplier(rewards.xp, xp_factor),
        materials: rewards.materials.clone(),
        artifacts: rewards.artifacts.clone(),
        ..Default::default()
    }
}

// ============================================================================
// Partial Rewards
// ============================================================================

/// Client-claimed rewards for waves that were never verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialClaim {
    pub gold: u64,
    pub dust: u64,
    pub xp: u64,
    pub final_wave: u32,
}

/// Bounds applied to a partial claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialRewardLimits {
    pub max_wave_advance: u32,
    pub gold_per_wave: u64,
    pub dust_per_wave: u64,
    pub xp_per_wave: u64,
}

/// Clamp a partial claim. Never fails: an oversized claim is scaled and
/// capped rather than rejected.
///
/// The wave advance is clamped to `max_wave_advance`; if the claim exceeded
/// it, gold, dust and XP are scaled by `cap / claimed`. Each amount is then
/// capped by its per-wave ceiling, counting an unfinished wave as one.
pub fn sanitize_partial(
    claim: &PartialClaim,
    last_verified_wave: u32,
    limits: &PartialRewardLimits,
) -> SessionEndCommit {
    let claimed_advance = claim.final_wave.saturating_sub(last_verified_wave);
    let advance = claimed_advance.min(limits.max_wave_advance);

    let scale = |amount: u64| {
        if claimed_advance > advance {
            let scaled = u128::from(amount) * u128::from(advance) / u128::from(claimed_advance);
            u64::try_from(scaled).unwrap_or(u64::MAX)
        } else {
            amount
        }
    };
    let waves = u64::from(advance.max(1));

    SessionEndCommit {
        final_wave: last_verified_wave + advance,
        gold: scale(claim.gold).min(limits.gold_per_wave.saturating_mul(waves)),
        dust: scale(claim.dust).min(limits.dust_per_wave.saturating_mul(waves)),
        xp: scale(claim.xp).min(limits.xp_per_wave.saturating_mul(waves)),
    }
}
