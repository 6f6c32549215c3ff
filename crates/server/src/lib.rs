//! Bastion Server Edge
//!
//! The Server Edge verifies client-played segments before crediting any
//! reward. It owns:
//! - Session lifecycle and signed session tokens
//! - Audit tick selection
//! - Segment replay verification (via `bastion-replay`)
//! - Reward calculation and atomic crediting with optimistic concurrency
//! - Partial reward sanitising at session end
//!
//! # Architecture
//!
//! Every request is independent: the server holds no per-session state in
//! memory, only collaborators. Segment verification for different sessions
//! may run on many threads at once. Two submissions for the same segment
//! race at `ProgressStore::commit_segment`, which accepts exactly one.
//!
//! Rejections never mutate persisted progress.

#![deny(unsafe_code)]

pub mod audit;
pub mod providers;
pub mod rewards;
pub mod session;
pub mod store;
pub mod token;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bastion_replay::{ReplayLimits, SegmentClaim, VerifiedSegment, VerifyError, verify_segment};
use bastion_sim::{Phase, SIM_VERSION, SimConfig, derive_segment_seed};
use bastion_wire::{
    EndSessionRequest, EndSessionResult, PartialRewardsProto, SegmentResult, SegmentSubmission,
    SessionTokenPayload, SignedSessionToken, SimConfigProto, StartSessionRequest,
    StartSessionResponse, materials_to_proto,
};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use providers::{
    Clock, EventMultiplierProvider, GuildBonusProvider, NoGuild, RemoteConfigProvider,
    StaticEventMultipliers, StaticRemoteConfig, SystemClock,
};
use rewards::{PartialClaim, PartialRewardLimits, sanitize_partial, segment_commit};
use store::{Balances, ProgressStore, SessionRecord, StoreError};
use token::TokenError;

// ============================================================================
// Default Parameters
// ============================================================================

/// Session token lifetime in milliseconds.
pub const TOKEN_TTL_MS: u64 = 2 * 60 * 60 * 1000;

/// Waves per segment.
pub const SEGMENT_SIZE: u32 = 5;

/// Typical ticks to clear one wave; bounds audit tick selection.
pub const EXPECTED_TICKS_PER_WAVE: u64 = 900;

/// Replay budget per wave before a segment is rejected.
pub const TICK_CAP_PER_WAVE: u64 = 5_400;

pub const MAX_EVENTS_PER_SEGMENT: usize = 2_048;

pub const PARTIAL_GOLD_PER_WAVE: u64 = 250;
pub const PARTIAL_DUST_PER_WAVE: u64 = 5;
pub const PARTIAL_XP_PER_WAVE: u64 = 120;

// ============================================================================
// Reject Reason
// ============================================================================

/// Stable reject codes returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidToken,
    TokenExpired,
    SessionMismatch,
    SessionNotActive,
    InvalidSegmentStart,
    SimVersionMismatch,
    InvalidEventsPayload,
    ReplayError,
    SegmentTickCap,
    EndWaveMismatch,
    HashMismatch,
    MissingAuditCheckpoint,
    CheckpointChainBroken,
    CheckpointMismatch,
    ConcurrentSubmission,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SessionMismatch => "SESSION_MISMATCH",
            Self::SessionNotActive => "SESSION_NOT_ACTIVE",
            Self::InvalidSegmentStart => "INVALID_SEGMENT_START",
            Self::SimVersionMismatch => "SIM_VERSION_MISMATCH",
            Self::InvalidEventsPayload => "INVALID_EVENTS_PAYLOAD",
            Self::ReplayError => "REPLAY_ERROR",
            Self::SegmentTickCap => "SEGMENT_TICK_CAP",
            Self::EndWaveMismatch => "END_WAVE_MISMATCH",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::MissingAuditCheckpoint => "MISSING_AUDIT_CHECKPOINT",
            Self::CheckpointChainBroken => "CHECKPOINT_CHAIN_BROKEN",
            Self::CheckpointMismatch => "CHECKPOINT_MISMATCH",
            Self::ConcurrentSubmission => "CONCURRENT_SUBMISSION",
        }
    }
}

impl From<&VerifyError> for RejectReason {
    fn from(e: &VerifyError) -> Self {
        match e {
            VerifyError::TooManyEvents { .. }
            | VerifyError::MalformedEvent { .. }
            | VerifyError::InvalidEvents(_) => Self::InvalidEventsPayload,
            VerifyError::InvalidConfig(_) => Self::ReplayError,
            VerifyError::TickCapExceeded { .. } => Self::SegmentTickCap,
            VerifyError::EndWaveMismatch { .. } => Self::EndWaveMismatch,
            VerifyError::HashMismatch { .. } => Self::HashMismatch,
            VerifyError::MissingAuditCheckpoint { .. } => Self::MissingAuditCheckpoint,
            VerifyError::ChainBroken { .. } => Self::CheckpointChainBroken,
            VerifyError::CheckpointMismatch { .. } => Self::CheckpointMismatch,
        }
    }
}

impl From<&TokenError> for RejectReason {
    fn from(e: &TokenError) -> Self {
        match e {
            TokenError::Expired { .. } => Self::TokenExpired,
            _ => Self::InvalidToken,
        }
    }
}

/// A rejected request: code plus a log-only detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Failures of requests that aren't segment verdicts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("loadout: {0}")]
    Loadout(#[from] bastion_wire::ConversionError),

    #[error("config: {0}")]
    Config(#[from] bastion_sim::ConfigError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

// ============================================================================
// Server Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub sim_version: String,
    pub token_secret: Vec<u8>,
    pub token_ttl_ms: u64,
    pub tick_rate_hz: u32,
    pub checkpoint_interval: u32,
    pub segment_size: u32,
    pub endless: bool,
    pub max_waves: u32,
    pub tick_cap_per_wave: u64,
    pub expected_ticks_per_wave: u64,
    pub max_events_per_segment: usize,
    pub max_partial_wave_advance: u32,
    pub partial_gold_per_wave: u64,
    pub partial_dust_per_wave: u64,
    pub partial_xp_per_wave: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sim_version: SIM_VERSION.to_string(),
            token_secret: b"bastion-dev-secret".to_vec(),
            token_ttl_ms: TOKEN_TTL_MS,
            tick_rate_hz: bastion_sim::config::DEFAULT_TICK_RATE_HZ,
            checkpoint_interval: bastion_sim::config::DEFAULT_CHECKPOINT_INTERVAL,
            segment_size: SEGMENT_SIZE,
            endless: true,
            max_waves: bastion_sim::config::DEFAULT_MAX_WAVES,
            tick_cap_per_wave: TICK_CAP_PER_WAVE,
            expected_ticks_per_wave: EXPECTED_TICKS_PER_WAVE,
            max_events_per_segment: MAX_EVENTS_PER_SEGMENT,
            max_partial_wave_advance: SEGMENT_SIZE,
            partial_gold_per_wave: PARTIAL_GOLD_PER_WAVE,
            partial_dust_per_wave: PARTIAL_DUST_PER_WAVE,
            partial_xp_per_wave: PARTIAL_XP_PER_WAVE,
        }
    }
}

impl ServerConfig {
    fn partial_limits(&self) -> PartialRewardLimits {
        PartialRewardLimits {
            max_wave_advance: self.max_partial_wave_advance,
            gold_per_wave: self.partial_gold_per_wave,
            dust_per_wave: self.partial_dust_per_wave,
            xp_per_wave: self.partial_xp_per_wave,
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ProgressStore>,
    pub remote_config: Arc<dyn RemoteConfigProvider>,
    pub event_multipliers: Arc<dyn EventMultiplierProvider>,
    pub guild: Arc<dyn GuildBonusProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Default balance, no events, no guild, wall clock.
    pub fn with_store(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            remote_config: Arc::new(StaticRemoteConfig::default()),
            event_multipliers: Arc::new(StaticEventMultipliers::default()),
            guild: Arc::new(NoGuild),
            clock: Arc::new(SystemClock),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Accepted segment plus the token for the next one.
struct Accepted {
    verified: VerifiedSegment,
    balances: Balances,
    credited: store::SegmentCommit,
    next: Option<(SignedSessionToken, Vec<u64>)>,
}

pub struct Server {
    config: ServerConfig,
    deps: Collaborators,
}

impl Server {
    pub fn new(config: ServerConfig, deps: Collaborators) -> Self {
        Self { config, deps }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open a session at wave 0 and issue its first segment token.
    pub fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, ServerError> {
        let profile = self.deps.store.profile(&request.user_id)?;
        let loadout = session::decode_loadout(request)?;
        let guild = self.deps.guild.bonus_for(&request.user_id);
        let sim_config = session::initial_sim_config(
            &self.config,
            &profile,
            &loadout,
            self.deps.remote_config.balance(),
            &guild,
        );
        sim_config.validate()?;

        let mut rng = rand::rng();
        let now_ms = self.deps.clock.now_ms();
        let record = SessionRecord {
            session_id: session::new_session_id(&mut rng),
            user_id: request.user_id.clone(),
            session_seed: rng.random(),
            loadout,
            last_verified_wave: 0,
            relics: Vec::new(),
            active: true,
            started_at_ms: now_ms,
        };
        let (token, _) = self.issue_token(&record, &sim_config, 0, now_ms)?;
        self.deps.store.create_session(record.clone())?;

        info!(
            session_id = %record.session_id,
            user_id = %record.user_id,
            "session started"
        );
        Ok(StartSessionResponse {
            session_id: record.session_id,
            token: Some(token),
            inventory: Some(profile.inventory.to_proto()),
            progression: Some(profile.progression.to_proto()),
        })
    }

    /// Verify a segment and credit it. Every failure is reported in the
    /// result; nothing is persisted unless the segment is accepted.
    pub fn submit_segment(&self, submission: &SegmentSubmission) -> SegmentResult {
        match self.verify_and_commit(submission) {
            Ok(accepted) => {
                info!(
                    session_id = %submission.session_id,
                    start_wave = submission.start_wave,
                    end_wave = accepted.verified.end_wave,
                    ticks = accepted.verified.ticks,
                    gold = accepted.credited.gold,
                    "segment accepted"
                );
                let (next_token, next_audit) = accepted.next.unzip();
                SegmentResult {
                    verified: true,
                    reject_reason: String::new(),
                    reject_detail: String::new(),
                    end_wave: accepted.verified.end_wave,
                    gold_earned: accepted.credited.gold,
                    dust_earned: accepted.credited.dust,
                    xp_earned: accepted.credited.xp,
                    materials_earned: materials_to_proto(&accepted.credited.materials),
                    artifacts_earned: accepted.credited.artifacts.iter().map(|a| a.id()).collect(),
                    next_segment_audit_ticks: next_audit.unwrap_or_default(),
                    next_token,
                    new_inventory: Some(accepted.balances.inventory.to_proto()),
                    new_progression: Some(accepted.balances.progression.to_proto()),
                }
            }
            Err(rejection) => {
                warn!(
                    session_id = %submission.session_id,
                    start_wave = submission.start_wave,
                    reason = rejection.reason.as_str(),
                    detail = %rejection.detail,
                    "segment rejected"
                );
                SegmentResult {
                    verified: false,
                    reject_reason: rejection.reason.as_str().to_string(),
                    reject_detail: rejection.detail,
                    ..Default::default()
                }
            }
        }
    }

    /// Close a session, crediting sanitised partial rewards for the
    /// unverified tail. Oversized claims are clamped, never rejected.
    pub fn end_session(&self, request: &EndSessionRequest) -> EndSessionResult {
        let outcome = self
            .authorize(&request.session_id, request.token.as_ref())
            .and_then(|(_, record)| {
                let claim = request.partial_rewards.as_ref().map_or_else(
                    || PartialClaim {
                        final_wave: record.last_verified_wave,
                        ..Default::default()
                    },
                    |p| PartialClaim {
                        gold: p.gold,
                        dust: p.dust,
                        xp: p.xp,
                        final_wave: p.final_wave,
                    },
                );
                let commit = sanitize_partial(
                    &claim,
                    record.last_verified_wave,
                    &self.config.partial_limits(),
                );
                self.deps
                    .store
                    .end_session(&record.session_id, &commit)
                    .map(|balances| (commit, balances))
                    .map_err(|e| store_rejection(&e))
            });

        match outcome {
            Ok((commit, balances)) => {
                info!(
                    session_id = %request.session_id,
                    final_wave = commit.final_wave,
                    gold = commit.gold,
                    "session ended"
                );
                EndSessionResult {
                    reject_reason: String::new(),
                    credited: Some(PartialRewardsProto {
                        gold: commit.gold,
                        dust: commit.dust,
                        xp: commit.xp,
                        final_wave: commit.final_wave,
                    }),
                    final_wave: commit.final_wave,
                    new_inventory: Some(balances.inventory.to_proto()),
                    new_progression: Some(balances.progression.to_proto()),
                }
            }
            Err(rejection) => {
                warn!(
                    session_id = %request.session_id,
                    reason = rejection.reason.as_str(),
                    detail = %rejection.detail,
                    "session end rejected"
                );
                EndSessionResult {
                    reject_reason: rejection.reason.as_str().to_string(),
                    ..Default::default()
                }
            }
        }
    }

    // ========================================================================
    // Internal Methods
    // ========================================================================

    /// Check the token and that it belongs to a live session.
    fn authorize(
        &self,
        session_id: &str,
        token: Option<&SignedSessionToken>,
    ) -> Result<(SessionTokenPayload, SessionRecord), Rejection> {
        let token = token.ok_or_else(|| {
            Rejection::new(RejectReason::InvalidToken, TokenError::Missing.to_string())
        })?;
        let payload = token::verify(token, &self.config.token_secret, self.deps.clock.now_ms())
            .map_err(|e| Rejection::new(RejectReason::from(&e), e.to_string()))?;

        if payload.session_id != session_id {
            return Err(Rejection::new(
                RejectReason::SessionMismatch,
                format!("token is for session {}", payload.session_id),
            ));
        }
        let record = self
            .deps
            .store
            .session(session_id)
            .map_err(|e| Rejection::new(RejectReason::SessionMismatch, e.to_string()))?;
        if record.user_id != payload.user_id {
            return Err(Rejection::new(
                RejectReason::SessionMismatch,
                "token user does not own the session",
            ));
        }
        if !record.active {
            return Err(Rejection::new(
                RejectReason::SessionNotActive,
                "session already ended",
            ));
        }
        Ok((payload, record))
    }

    fn verify_and_commit(&self, submission: &SegmentSubmission) -> Result<Accepted, Rejection> {
        let (payload, record) =
            self.authorize(&submission.session_id, submission.token.as_ref())?;

        let start_wave = record.last_verified_wave;
        if submission.start_wave != start_wave || payload.start_wave != start_wave {
            return Err(Rejection::new(
                RejectReason::InvalidSegmentStart,
                format!(
                    "segment starts at {} (token {}), last verified wave is {start_wave}",
                    submission.start_wave, payload.start_wave
                ),
            ));
        }
        if payload.sim_version != self.config.sim_version {
            return Err(Rejection::new(
                RejectReason::SimVersionMismatch,
                format!(
                    "token sim version {}, server runs {}",
                    payload.sim_version, self.config.sim_version
                ),
            ));
        }

        let sim_config = payload
            .sim_config
            .as_ref()
            .ok_or_else(|| Rejection::new(RejectReason::ReplayError, "token has no config"))
            .and_then(|proto| {
                SimConfig::try_from(proto)
                    .map_err(|e| Rejection::new(RejectReason::ReplayError, e.to_string()))
            })?;

        let limits = ReplayLimits {
            tick_cap: u64::from(sim_config.segment_size)
                .saturating_mul(self.config.tick_cap_per_wave),
            max_events: self.config.max_events_per_segment,
        };
        let claim = SegmentClaim::from_submission(submission, payload.seed, &payload.audit_ticks);
        debug!(
            session_id = %record.session_id,
            start_wave,
            events = submission.events.len(),
            tick_cap = limits.tick_cap,
            "replaying segment"
        );
        let verified = replay_guarded(sim_config.clone(), &claim, limits)?;

        let now_ms = self.deps.clock.now_ms();
        let mut commit = segment_commit(
            &verified.rewards,
            self.deps.event_multipliers.multipliers_at(now_ms),
            &self.deps.guild.bonus_for(&record.user_id),
        );
        commit.end_wave = verified.end_wave;
        commit.relics = verified.relics.clone();
        commit.closes_session = matches!(verified.phase, Phase::Won | Phase::Lost);

        let next = if commit.closes_session {
            None
        } else {
            let next_config =
                session::next_sim_config(&sim_config, verified.end_wave, &verified.relics);
            Some(
                self.issue_token(&record, &next_config, verified.end_wave, now_ms)
                    .map_err(|e| Rejection::new(RejectReason::InvalidToken, e.to_string()))?,
            )
        };

        let balances = self
            .deps
            .store
            .commit_segment(&record.session_id, start_wave, &commit)
            .map_err(|e| store_rejection(&e))?;

        Ok(Accepted {
            verified,
            balances,
            credited: commit,
            next,
        })
    }

    /// Sign a token for the segment starting after `start_wave`.
    fn issue_token(
        &self,
        record: &SessionRecord,
        sim_config: &SimConfig,
        start_wave: u32,
        now_ms: u64,
    ) -> Result<(SignedSessionToken, Vec<u64>), TokenError> {
        let audit_ticks = audit::choose_audit_ticks(
            &mut rand::rng(),
            sim_config.segment_size,
            self.config.expected_ticks_per_wave,
        );
        let payload = SessionTokenPayload {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            seed: derive_segment_seed(record.session_seed, start_wave),
            sim_version: self.config.sim_version.clone(),
            start_wave,
            audit_ticks: audit_ticks.clone(),
            sim_config: Some(SimConfigProto::from(sim_config)),
            issued_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(self.config.token_ttl_ms),
        };
        Ok((token::sign(&payload, &self.config.token_secret)?, audit_ticks))
    }
}

fn store_rejection(e: &StoreError) -> Rejection {
    let reason = match e {
        StoreError::Conflict { .. } => RejectReason::ConcurrentSubmission,
        StoreError::SessionNotActive(_) => RejectReason::SessionNotActive,
        _ => RejectReason::SessionMismatch,
    };
    Rejection::new(reason, e.to_string())
}

/// Replay with panics contained; a panicking replay is a `REPLAY_ERROR`.
fn replay_guarded(
    sim_config: SimConfig,
    claim: &SegmentClaim<'_>,
    limits: ReplayLimits,
) -> Result<VerifiedSegment, Rejection> {
    match catch_unwind(AssertUnwindSafe(|| verify_segment(sim_config, claim, limits))) {
        Ok(Ok(verified)) => Ok(verified),
        Ok(Err(e)) => Err(Rejection::new(RejectReason::from(&e), e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "replay panicked".to_string());
            Err(Rejection::new(RejectReason::ReplayError, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_codes_are_stable() {
        assert_eq!(RejectReason::HashMismatch.as_str(), "HASH_MISMATCH");
        assert_eq!(
            RejectReason::InvalidSegmentStart.as_str(),
            "INVALID_SEGMENT_START"
        );
        assert_eq!(
            RejectReason::ConcurrentSubmission.as_str(),
            "CONCURRENT_SUBMISSION"
        );
    }

    #[test]
    fn test_verify_errors_map_to_codes() {
        let cases = [
            (
                VerifyError::TickCapExceeded { cap: 1 },
                RejectReason::SegmentTickCap,
            ),
            (
                VerifyError::ChainBroken { index: 0, tick: 3 },
                RejectReason::CheckpointChainBroken,
            ),
            (
                VerifyError::TooManyEvents { count: 9, max: 1 },
                RejectReason::InvalidEventsPayload,
            ),
            (
                VerifyError::InvalidConfig(bastion_sim::ConfigError::ZeroTickRate),
                RejectReason::ReplayError,
            ),
        ];
        for (error, reason) in cases {
            assert_eq!(RejectReason::from(&error), reason);
        }
    }

    #[test]
    fn test_store_conflict_is_concurrent_submission() {
        let rejection = store_rejection(&StoreError::Conflict {
            expected: 5,
            actual: 10,
        });
        assert_eq!(rejection.reason, RejectReason::ConcurrentSubmission);
    }

    #[test]
    fn test_server_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Server>();
    }
}
