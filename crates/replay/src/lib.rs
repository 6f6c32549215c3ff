//! Bastion Replay System
//!
//! This crate records segments on the client and re-executes them on the
//! server.
//!
//! # Architecture
//!
//! - `SegmentRecorder`: drives a `Simulation`, remembers every submitted
//!   event with its tick, and builds the `SegmentSubmission`
//! - `verify_segment`: decodes and validates the submitted events, replays
//!   them on a fresh `Simulation` under a tick cap, and checks the claimed
//!   end wave, final hash and checkpoints against the replay
//!
//! Verification never trusts client arithmetic: rewards come from the
//! replayed state only.

#![deny(unsafe_code)]

use bastion_sim::content::RelicKind;
use bastion_sim::{
    Checkpoint, ConfigError, EventError, GameEvent, Phase, SegmentRewards, SimConfig, Simulation,
    Tick, TimedEvent, validate_event_list, verify_chain,
};
use bastion_wire::{
    CheckpointProto, ConversionError, GameEventProto, SegmentSubmission, SessionTokenPayload,
    SignedSessionToken,
};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Segment Recorder
// ============================================================================

/// A token payload the client can't build a segment from.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecorderError {
    #[error("token payload: {0}")]
    Conversion(#[from] ConversionError),

    #[error("config snapshot: {0}")]
    Config(#[from] ConfigError),
}

/// Client-side driver for one segment.
///
/// Events are scheduled through the recorder so the submission carries
/// exactly what the simulation consumed.
#[derive(Debug, Clone)]
pub struct SegmentRecorder {
    sim: Simulation,
    events: Vec<TimedEvent>,
}

impl SegmentRecorder {
    pub fn new(seed: u32, config: SimConfig, audit_ticks: &[Tick]) -> Result<Self, ConfigError> {
        let mut sim = Simulation::new(seed, config)?;
        sim.set_audit_ticks(audit_ticks.iter().copied());
        Ok(Self {
            sim,
            events: Vec::new(),
        })
    }

    /// Start the segment a session token describes.
    pub fn from_token(payload: &SessionTokenPayload) -> Result<Self, RecorderError> {
        let proto = payload
            .sim_config
            .as_ref()
            .ok_or(ConversionError::MissingField("sim_config"))?;
        let config = SimConfig::try_from(proto)?;
        Ok(Self::new(payload.seed, config, &payload.audit_ticks)?)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Schedule `event` for the current tick.
    pub fn submit(&mut self, event: GameEvent) -> Result<(), EventError> {
        let tick = self.sim.tick();
        self.submit_at(tick, event)
    }

    /// Schedule `event` for `tick` (current or future).
    pub fn submit_at(&mut self, tick: Tick, event: GameEvent) -> Result<(), EventError> {
        if let Some(last) = self.events.last()
            && tick < last.tick
        {
            return Err(EventError::OutOfOrder {
                index: self.events.len(),
            });
        }
        self.sim.queue_event(tick, event)?;
        self.events.push(TimedEvent { tick, event });
        Ok(())
    }

    pub fn step(&mut self) {
        self.sim.step();
    }

    /// Play until the segment stops or `tick_cap` is reached. `policy` is
    /// asked for events before every tick. Returns whether the segment
    /// stopped on its own.
    pub fn run(
        &mut self,
        tick_cap: Tick,
        mut policy: impl FnMut(&Simulation) -> Vec<GameEvent>,
    ) -> Result<bool, EventError> {
        loop {
            for event in policy(&self.sim) {
                self.submit(event)?;
            }
            if self.sim.should_stop() {
                return Ok(true);
            }
            if self.sim.tick() >= tick_cap {
                return Ok(false);
            }
            self.sim.step();
        }
    }

    /// Everything the server needs to verify this segment.
    pub fn build_submission(
        &self,
        session_id: &str,
        token: SignedSessionToken,
    ) -> SegmentSubmission {
        SegmentSubmission {
            session_id: session_id.to_string(),
            token: Some(token),
            start_wave: self.sim.config().start_wave,
            end_wave: self.sim.state().cleared_wave(),
            events: self.events.iter().map(GameEventProto::from).collect(),
            checkpoints: self.sim.checkpoints().iter().map(CheckpointProto::from).collect(),
            final_hash: self.sim.final_hash(),
        }
    }
}

/// Policy that takes the first option of every relic window and retries
/// after a loss.
pub fn auto_play(sim: &Simulation) -> Vec<GameEvent> {
    let state = sim.state();
    if state.relic_choice.is_some() {
        vec![GameEvent::ChooseRelic { index: 0 }]
    } else if state.phase == Phase::Lost && sim.config().endless && sim.is_halted() {
        vec![GameEvent::Retry]
    } else {
        Vec::new()
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Why a submitted segment failed verification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("{count} events exceeds the limit of {max}")]
    TooManyEvents { count: usize, max: usize },

    #[error("event {index} is malformed: {source}")]
    MalformedEvent {
        index: usize,
        source: ConversionError,
    },

    #[error("event list rejected: {0}")]
    InvalidEvents(EventError),

    #[error("config snapshot rejected: {0}")]
    InvalidConfig(ConfigError),

    #[error("segment did not finish within {cap} ticks")]
    TickCapExceeded { cap: Tick },

    #[error("claimed end wave {claimed}, replay reached {computed}")]
    EndWaveMismatch { claimed: u32, computed: u32 },

    #[error("claimed final hash {claimed:#018x}, replay produced {computed:#018x}")]
    HashMismatch { claimed: u64, computed: u64 },

    #[error("no checkpoint submitted for audit tick {tick}")]
    MissingAuditCheckpoint { tick: Tick },

    #[error("checkpoint chain broken at index {index} (tick {tick})")]
    ChainBroken { index: usize, tick: Tick },

    #[error("checkpoint at tick {tick} disagrees with replay")]
    CheckpointMismatch { tick: Tick },
}

/// Bounds a replay runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayLimits {
    pub tick_cap: Tick,
    pub max_events: usize,
}

/// A claimed segment, as decoded from a submission and its token.
#[derive(Debug, Clone, Copy)]
pub struct SegmentClaim<'a> {
    pub seed: u32,
    pub audit_ticks: &'a [Tick],
    pub end_wave: u32,
    pub final_hash: u64,
    pub events: &'a [GameEventProto],
    pub checkpoints: &'a [CheckpointProto],
}

impl<'a> SegmentClaim<'a> {
    pub fn from_submission(
        submission: &'a SegmentSubmission,
        seed: u32,
        audit_ticks: &'a [Tick],
    ) -> Self {
        Self {
            seed,
            audit_ticks,
            end_wave: submission.end_wave,
            final_hash: submission.final_hash,
            events: &submission.events,
            checkpoints: &submission.checkpoints,
        }
    }
}

/// What the replay established. Rewards are authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSegment {
    pub end_wave: u32,
    pub final_hash: u64,
    pub ticks: Tick,
    pub phase: Phase,
    pub rewards: SegmentRewards,
    /// Relics held at the end, carried into the next segment.
    pub relics: Vec<RelicKind>,
}

/// Decode and validate a submitted event list.
pub fn decode_events(
    events: &[GameEventProto],
    max_events: usize,
) -> Result<Vec<TimedEvent>, VerifyError> {
    if events.len() > max_events {
        return Err(VerifyError::TooManyEvents {
            count: events.len(),
            max: max_events,
        });
    }
    let decoded = events
        .iter()
        .enumerate()
        .map(|(index, proto)| {
            TimedEvent::try_from(proto)
                .map_err(|source| VerifyError::MalformedEvent { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;
    validate_event_list(&decoded).map_err(VerifyError::InvalidEvents)?;
    Ok(decoded)
}

/// Run a fresh simulation over `events` until the segment stops.
pub fn replay_segment(
    seed: u32,
    config: SimConfig,
    audit_ticks: &[Tick],
    events: &[TimedEvent],
    tick_cap: Tick,
) -> Result<Simulation, VerifyError> {
    let mut sim = Simulation::new(seed, config).map_err(VerifyError::InvalidConfig)?;
    sim.set_audit_ticks(audit_ticks.iter().copied());
    for timed in events {
        sim.queue_event(timed.tick, timed.event)
            .map_err(VerifyError::InvalidEvents)?;
    }

    while !sim.should_stop() {
        if sim.tick() >= tick_cap {
            return Err(VerifyError::TickCapExceeded { cap: tick_cap });
        }
        sim.step();
    }
    debug!(
        ticks = sim.tick(),
        end_wave = sim.state().cleared_wave(),
        checkpoints = sim.checkpoints().len(),
        "replay finished"
    );
    Ok(sim)
}

/// Replay a claimed segment and check every claim against the replay.
pub fn verify_segment(
    config: SimConfig,
    claim: &SegmentClaim<'_>,
    limits: ReplayLimits,
) -> Result<VerifiedSegment, VerifyError> {
    let events = decode_events(claim.events, limits.max_events)?;
    let sim = replay_segment(
        claim.seed,
        config,
        claim.audit_ticks,
        &events,
        limits.tick_cap,
    )?;

    let end_wave = sim.state().cleared_wave();
    if end_wave != claim.end_wave {
        return Err(VerifyError::EndWaveMismatch {
            claimed: claim.end_wave,
            computed: end_wave,
        });
    }

    let final_hash = sim.final_hash();
    if final_hash != claim.final_hash {
        return Err(VerifyError::HashMismatch {
            claimed: claim.final_hash,
            computed: final_hash,
        });
    }

    let submitted: Vec<Checkpoint> = claim.checkpoints.iter().map(Checkpoint::from).collect();
    check_checkpoints(&sim, &submitted, claim.audit_ticks)?;

    Ok(VerifiedSegment {
        end_wave,
        final_hash,
        ticks: sim.tick(),
        phase: sim.state().phase,
        rewards: sim.rewards(),
        relics: sim.state().relics.clone(),
    })
}

/// Audit ticks the replay reached must be present, the submitted chain must
/// link, and every submitted checkpoint must match the replay's.
fn check_checkpoints(
    sim: &Simulation,
    submitted: &[Checkpoint],
    audit_ticks: &[Tick],
) -> Result<(), VerifyError> {
    for &tick in audit_ticks.iter().filter(|&&t| t < sim.tick()) {
        if !submitted.iter().any(|c| c.tick == tick) {
            return Err(VerifyError::MissingAuditCheckpoint { tick });
        }
    }

    verify_chain(submitted)
        .map_err(|b| VerifyError::ChainBroken {
            index: b.index,
            tick: b.tick,
        })?;

    let replayed = sim.checkpoints();
    for c in submitted {
        let matches = replayed
            .binary_search_by_key(&c.tick, |r| r.tick)
            .is_ok_and(|i| replayed[i] == *c);
        if !matches {
            return Err(VerifyError::CheckpointMismatch { tick: c.tick });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_sim::chain_hash;

    const LIMITS: ReplayLimits = ReplayLimits {
        tick_cap: 30_000,
        max_events: 512,
    };

    fn config() -> SimConfig {
        SimConfig {
            segment_size: 1,
            checkpoint_interval: 200,
            ..Default::default()
        }
    }

    fn record(seed: u32, audit: &[Tick]) -> SegmentSubmission {
        let mut recorder = SegmentRecorder::new(seed, config(), audit).unwrap();
        recorder.submit_at(5, GameEvent::RerollRelics).unwrap();
        let finished = recorder.run(LIMITS.tick_cap, auto_play).unwrap();
        assert!(finished);
        recorder.build_submission("s", SignedSessionToken::default())
    }

    fn verify(submission: &SegmentSubmission, seed: u32, audit: &[Tick]) -> Result<VerifiedSegment, VerifyError> {
        let claim = SegmentClaim::from_submission(submission, seed, audit);
        verify_segment(config(), &claim, LIMITS)
    }

    #[test]
    fn test_recorded_segment_verifies() {
        let audit = [40, 150];
        let submission = record(77, &audit);
        let verified = verify(&submission, 77, &audit).unwrap();
        assert_eq!(verified.end_wave, submission.end_wave);
        assert_eq!(verified.final_hash, submission.final_hash);
        assert!(submission.checkpoints.iter().any(|c| c.tick == 40));
        assert!(verified.rewards.gold > 0 || verified.phase == Phase::Lost);
    }

    #[test]
    fn test_wrong_seed_fails() {
        let submission = record(77, &[]);
        let result = verify(&submission, 78, &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tampered_final_hash() {
        let mut submission = record(3, &[]);
        submission.final_hash ^= 1;
        assert!(matches!(
            verify(&submission, 3, &[]),
            Err(VerifyError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_inflated_end_wave() {
        let mut submission = record(3, &[]);
        submission.end_wave += 1;
        assert!(matches!(
            verify(&submission, 3, &[]),
            Err(VerifyError::EndWaveMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_audit_checkpoint() {
        let audit = [60];
        let mut submission = record(12, &audit);
        submission.checkpoints.retain(|c| c.tick != 60);
        assert_eq!(
            verify(&submission, 12, &audit),
            Err(VerifyError::MissingAuditCheckpoint { tick: 60 })
        );
    }

    #[test]
    fn test_forged_chain_link() {
        let audit = [60];
        let mut submission = record(12, &audit);
        submission.checkpoints[0].chain_hash ^= 0xff;
        assert!(matches!(
            verify(&submission, 12, &audit),
            Err(VerifyError::ChainBroken { index: 0, .. })
        ));
    }

    #[test]
    fn test_consistent_but_wrong_checkpoint() {
        let audit = [60];
        let mut submission = record(12, &audit);
        // Rebuild a self-consistent chain around a forged state hash.
        submission.checkpoints[0].state_hash ^= 0xff;
        let mut previous = 0;
        for c in submission.checkpoints.iter_mut() {
            c.chain_hash = chain_hash(c.state_hash, previous);
            previous = c.chain_hash;
        }
        assert_eq!(
            verify(&submission, 12, &audit),
            Err(VerifyError::CheckpointMismatch { tick: 60 })
        );
    }

    #[test]
    fn test_tick_cap() {
        let submission = record(5, &[]);
        let claim = SegmentClaim::from_submission(&submission, 5, &[]);
        let limits = ReplayLimits {
            tick_cap: 50,
            ..LIMITS
        };
        assert_eq!(
            verify_segment(config(), &claim, limits),
            Err(VerifyError::TickCapExceeded { cap: 50 })
        );
    }

    #[test]
    fn test_event_payload_checks() {
        let mut events = vec![
            GameEventProto::from(&TimedEvent {
                tick: 10,
                event: GameEvent::RerollRelics,
            }),
            GameEventProto::from(&TimedEvent {
                tick: 4,
                event: GameEvent::RerollRelics,
            }),
        ];
        assert_eq!(
            decode_events(&events, 10),
            Err(VerifyError::InvalidEvents(EventError::OutOfOrder { index: 1 }))
        );
        assert!(matches!(
            decode_events(&events, 1),
            Err(VerifyError::TooManyEvents { count: 2, max: 1 })
        ));
        events[1].tick = 12;
        events[1].kind = 40;
        assert!(matches!(
            decode_events(&events, 10),
            Err(VerifyError::MalformedEvent { index: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_replay_error() {
        let bad = SimConfig {
            segment_size: 0,
            ..config()
        };
        assert_eq!(
            replay_segment(1, bad, &[], &[], 10).err(),
            Some(VerifyError::InvalidConfig(ConfigError::ZeroSegmentSize))
        );
    }

    #[test]
    fn test_recorder_refuses_out_of_order() {
        let mut recorder = SegmentRecorder::new(1, config(), &[]).unwrap();
        recorder.submit_at(10, GameEvent::RerollRelics).unwrap();
        assert_eq!(
            recorder.submit_at(9, GameEvent::RerollRelics),
            Err(EventError::OutOfOrder { index: 1 })
        );
        assert_eq!(recorder.events().len(), 1);
    }
}
