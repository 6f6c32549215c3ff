//! End-to-end segment protocol: a client plays with `SegmentRecorder`, the
//! server verifies and credits.

use std::sync::Arc;
use std::thread;

use bastion_replay::{SegmentRecorder, auto_play};
use bastion_server::providers::{EventMultipliers, FixedClock, StaticEventMultipliers};
use bastion_server::store::{MemoryStore, Profile, ProgressStore};
use bastion_server::{Collaborators, Server, ServerConfig};
use bastion_sim::content::{FortressClass, HeroKind, Pillar, TurretKind};
use bastion_sim::fixed::from_pct;
use bastion_sim::{SIM_VERSION, SegmentRewards};
use bastion_wire::{
    EndSessionRequest, PartialRewardsProto, SegmentSubmission, SessionTokenPayload,
    SignedSessionToken, StartSessionRequest, TurretPlacementProto,
};
use prost::Message;

const USER: &str = "player-1";
const NOW_MS: u64 = 1_700_000_000_000;
const CLIENT_TICK_CAP: u64 = 40_000;

struct Harness {
    server: Server,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
}

fn harness(gold_multiplier_pct: i32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.insert_profile(Profile {
        unlocked_heroes: HeroKind::ALL.to_vec(),
        unlocked_turrets: TurretKind::ALL.to_vec(),
        unlocked_pillars: Pillar::ALL.to_vec(),
        ..Profile::starter(USER)
    });
    let clock = Arc::new(FixedClock::new(NOW_MS));
    let deps = Collaborators {
        clock: clock.clone(),
        event_multipliers: Arc::new(StaticEventMultipliers::always(EventMultipliers {
            gold: from_pct(gold_multiplier_pct),
            ..Default::default()
        })),
        ..Collaborators::with_store(store.clone())
    };

    let config = ServerConfig {
        token_secret: b"integration-secret".to_vec(),
        segment_size: 2,
        tick_cap_per_wave: CLIENT_TICK_CAP / 2,
        max_partial_wave_advance: 3,
        partial_gold_per_wave: 100,
        partial_dust_per_wave: 2,
        partial_xp_per_wave: 50,
        ..Default::default()
    };
    Harness {
        server: Server::new(config, deps),
        store,
        clock,
    }
}

fn start_request() -> StartSessionRequest {
    StartSessionRequest {
        user_id: USER.to_string(),
        fortress_class: FortressClass::Tech.id(),
        heroes: vec![HeroKind::Engineer.id(), HeroKind::Stormcaller.id()],
        turrets: [TurretKind::Cannon, TurretKind::Ballista, TurretKind::TeslaCoil]
            .iter()
            .zip(0u32..)
            .map(|(kind, slot)| TurretPlacementProto {
                kind: kind.id(),
                slot,
            })
            .collect(),
        equipped_artifacts: vec![],
    }
}

/// Play the segment a token describes, the way a client would.
fn play_segment(session_id: &str, token: &SignedSessionToken) -> (SegmentSubmission, SegmentRewards) {
    let payload = SessionTokenPayload::decode(token.payload.as_slice()).unwrap();
    let mut recorder = SegmentRecorder::from_token(&payload).unwrap();
    let stopped = recorder.run(CLIENT_TICK_CAP, auto_play).unwrap();
    assert!(stopped, "segment should finish within the client cap");
    (
        recorder.build_submission(session_id, token.clone()),
        recorder.simulation().rewards(),
    )
}

fn start(h: &Harness) -> (String, SignedSessionToken) {
    let response = h.server.start_session(&start_request()).unwrap();
    (response.session_id, response.token.unwrap())
}

#[test]
fn test_segment_accepted_and_credited_with_multiplier() {
    let h = harness(150);
    let (session_id, token) = start(&h);
    let (submission, rewards) = play_segment(&session_id, &token);

    let result = h.server.submit_segment(&submission);
    assert!(result.verified, "rejected: {}", result.reject_reason);
    assert_eq!(result.end_wave, submission.end_wave);
    assert_eq!(result.gold_earned, rewards.gold * 3 / 2);
    assert_eq!(result.dust_earned, rewards.dust);
    assert_eq!(result.xp_earned, rewards.xp);

    let inventory = result.new_inventory.unwrap();
    assert_eq!(inventory.gold, result.gold_earned);
    let session = h.store.session(&session_id).unwrap();
    assert_eq!(session.last_verified_wave, result.end_wave);

    // The next token starts where this segment ended.
    let next = result.next_token.unwrap();
    let payload = SessionTokenPayload::decode(next.payload.as_slice()).unwrap();
    assert_eq!(payload.start_wave, result.end_wave);
    assert_eq!(payload.audit_ticks, result.next_segment_audit_ticks);
}

#[test]
fn test_second_segment_continues_session() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (first, _) = play_segment(&session_id, &token);
    let result = h.server.submit_segment(&first);
    assert!(result.verified, "rejected: {}", result.reject_reason);

    let (second, _) = play_segment(&session_id, &result.next_token.unwrap());
    assert_eq!(second.start_wave, result.end_wave);
    let result = h.server.submit_segment(&second);
    assert!(result.verified, "rejected: {}", result.reject_reason);
    assert_eq!(
        h.store.session(&session_id).unwrap().last_verified_wave,
        result.end_wave
    );
}

#[test]
fn test_tampered_hash_rejected_without_credit() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (mut submission, _) = play_segment(&session_id, &token);
    submission.final_hash ^= 1;

    let result = h.server.submit_segment(&submission);
    assert!(!result.verified);
    assert_eq!(result.reject_reason, "HASH_MISMATCH");
    assert!(result.next_token.is_none());

    let profile = h.store.profile(USER).unwrap();
    assert_eq!(profile.inventory.gold, 0);
    assert_eq!(h.store.session(&session_id).unwrap().last_verified_wave, 0);
}

#[test]
fn test_inflated_end_wave_rejected() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (mut submission, _) = play_segment(&session_id, &token);
    submission.end_wave += 5;

    let result = h.server.submit_segment(&submission);
    assert_eq!(result.reject_reason, "END_WAVE_MISMATCH");
}

#[test]
fn test_resubmitting_a_verified_segment_is_rejected() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (submission, _) = play_segment(&session_id, &token);

    assert!(h.server.submit_segment(&submission).verified);
    let gold = h.store.profile(USER).unwrap().inventory.gold;

    let replayed = h.server.submit_segment(&submission);
    assert!(!replayed.verified);
    assert_eq!(replayed.reject_reason, "INVALID_SEGMENT_START");
    assert_eq!(h.store.profile(USER).unwrap().inventory.gold, gold);
}

#[test]
fn test_concurrent_submissions_credit_once() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (submission, _) = play_segment(&session_id, &token);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| s.spawn(|| h.server.submit_segment(&submission)))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let accepted: Vec<_> = results.iter().filter(|r| r.verified).collect();
    assert_eq!(accepted.len(), 1);
    let rejected = results.iter().find(|r| !r.verified).unwrap();
    assert!(
        rejected.reject_reason == "CONCURRENT_SUBMISSION"
            || rejected.reject_reason == "INVALID_SEGMENT_START",
        "unexpected reason {}",
        rejected.reject_reason
    );
    assert_eq!(
        h.store.profile(USER).unwrap().inventory.gold,
        accepted[0].gold_earned
    );
}

#[test]
fn test_expired_token_rejected() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (submission, _) = play_segment(&session_id, &token);

    h.clock.advance(h.server.config().token_ttl_ms);
    let result = h.server.submit_segment(&submission);
    assert_eq!(result.reject_reason, "TOKEN_EXPIRED");
}

#[test]
fn test_token_for_other_session_rejected() {
    let h = harness(100);
    let (session_a, token_a) = start(&h);
    let (session_b, _) = start(&h);
    assert_ne!(session_a, session_b);

    let (mut submission, _) = play_segment(&session_a, &token_a);
    submission.session_id = session_b;
    let result = h.server.submit_segment(&submission);
    assert_eq!(result.reject_reason, "SESSION_MISMATCH");
}

#[test]
fn test_forged_signature_rejected() {
    let h = harness(100);
    let (session_id, mut token) = start(&h);
    let (mut submission, _) = play_segment(&session_id, &token);
    token.signature[0] ^= 0xff;
    submission.token = Some(token);

    let result = h.server.submit_segment(&submission);
    assert_eq!(result.reject_reason, "INVALID_TOKEN");
}

#[test]
fn test_sim_version_mismatch() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (submission, _) = play_segment(&session_id, &token);

    let mut config = h.server.config().clone();
    config.sim_version = format!("{SIM_VERSION}-next");
    let upgraded = Server::new(
        config,
        Collaborators {
            clock: h.clock.clone(),
            ..Collaborators::with_store(h.store.clone())
        },
    );
    let result = upgraded.submit_segment(&submission);
    assert_eq!(result.reject_reason, "SIM_VERSION_MISMATCH");
}

#[test]
fn test_partial_rewards_sanitised_at_session_end() {
    let h = harness(100);
    let (session_id, token) = start(&h);
    let (submission, _) = play_segment(&session_id, &token);
    let verified = h.server.submit_segment(&submission);
    assert!(verified.verified);
    let gold_before = h.store.profile(USER).unwrap().inventory.gold;

    let result = h.server.end_session(&EndSessionRequest {
        session_id: session_id.clone(),
        token: verified.next_token.clone(),
        partial_rewards: Some(PartialRewardsProto {
            gold: 1_000_000,
            dust: 1,
            xp: 10,
            final_wave: verified.end_wave + 1,
        }),
    });
    assert!(result.reject_reason.is_empty(), "{}", result.reject_reason);
    let credited = result.credited.unwrap();
    assert_eq!(credited.gold, 100);
    assert_eq!((credited.dust, credited.xp), (1, 10));
    assert_eq!(result.final_wave, verified.end_wave + 1);
    assert_eq!(result.new_inventory.unwrap().gold, gold_before + 100);

    // The session is closed to further segments.
    let (late, _) = play_segment(&session_id, verified.next_token.as_ref().unwrap());
    let late = h.server.submit_segment(&late);
    assert_eq!(late.reject_reason, "SESSION_NOT_ACTIVE");
}

#[test]
fn test_unknown_user_cannot_start() {
    let h = harness(100);
    let mut request = start_request();
    request.user_id = "stranger".to_string();
    assert!(h.server.start_session(&request).is_err());
}

#[test]
fn test_final_wave_closes_session() {
    let h = harness(100);
    let finite = Server::new(
        ServerConfig {
            endless: false,
            max_waves: 2,
            ..h.server.config().clone()
        },
        Collaborators {
            clock: h.clock.clone(),
            ..Collaborators::with_store(h.store.clone())
        },
    );
    let response = finite.start_session(&start_request()).unwrap();
    let token = response.token.unwrap();
    let (submission, _) = play_segment(&response.session_id, &token);

    let result = finite.submit_segment(&submission);
    assert!(result.verified, "rejected: {}", result.reject_reason);
    assert!(result.next_token.is_none());
    assert!(result.next_segment_audit_ticks.is_empty());
    assert!(!h.store.session(&response.session_id).unwrap().active);

    let again = finite.submit_segment(&submission);
    assert_eq!(again.reject_reason, "SESSION_NOT_ACTIVE");
}
