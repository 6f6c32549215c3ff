//! Audit tick selection.
//!
//! The client can't predict which ticks it must checkpoint, so it can't
//! precompute a chain that only looks right at scheduled ticks.

use std::collections::BTreeSet;

use bastion_sim::Tick;
use rand::Rng;

pub const MIN_AUDIT_TICKS: usize = 2;
pub const MAX_AUDIT_TICKS: usize = 3;

/// Pick 2 or 3 distinct ticks uniformly from `[1, segment_size *
/// expected_ticks_per_wave]`, ascending. Pass a CSPRNG in production.
pub fn choose_audit_ticks<R: Rng + ?Sized>(
    rng: &mut R,
    segment_size: u32,
    expected_ticks_per_wave: u64,
) -> Vec<Tick> {
    let horizon = u64::from(segment_size)
        .saturating_mul(expected_ticks_per_wave)
        .max(1);
    let count = rng
        .random_range(MIN_AUDIT_TICKS..=MAX_AUDIT_TICKS)
        .min(usize::try_from(horizon).unwrap_or(usize::MAX));

    let mut ticks = BTreeSet::new();
    while ticks.len() < count {
        ticks.insert(rng.random_range(1..=horizon));
    }
    ticks.into_iter().collect()
}
