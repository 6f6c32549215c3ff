//! Profile and session persistence boundary.
//!
//! `ProgressStore` is the only shared mutable resource the server touches.
//! Segment commits are a compare-and-set on `last_verified_wave`: the store
//! re-reads it under its own lock and refuses the write if it moved.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bastion_sim::content::{
    ArtifactKind, FortressClass, HeroKind, MaterialKind, Pillar, RelicKind, TurretKind,
};
use bastion_sim::config::TurretPlacement;
use bastion_wire::{InventoryProto, ProgressionProto, materials_to_proto};
use thiserror::Error;

use crate::session::SessionId;

/// XP per commander level.
pub const XP_PER_LEVEL: u64 = 1_000;
pub const MAX_COMMANDER_LEVEL: u32 = 100;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inventory {
    pub gold: u64,
    pub dust: u64,
    pub materials: BTreeMap<MaterialKind, u32>,
    pub artifacts: Vec<ArtifactKind>,
}

impl Inventory {
    pub fn to_proto(&self) -> InventoryProto {
        InventoryProto {
            gold: self.gold,
            dust: self.dust,
            materials: materials_to_proto(&self.materials),
            artifacts: self.artifacts.iter().map(|a| a.id()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progression {
    pub total_xp: u64,
    pub commander_level: u32,
    pub highest_wave: u32,
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            total_xp: 0,
            commander_level: 1,
            highest_wave: 0,
        }
    }
}

impl Progression {
    pub fn level_for_xp(total_xp: u64) -> u32 {
        let level = 1 + total_xp / XP_PER_LEVEL;
        level.min(u64::from(MAX_COMMANDER_LEVEL)) as u32
    }

    fn add_xp(&mut self, xp: u64) {
        self.total_xp = self.total_xp.saturating_add(xp);
        self.commander_level = Self::level_for_xp(self.total_xp);
    }

    pub fn to_proto(&self) -> ProgressionProto {
        ProgressionProto {
            total_xp: self.total_xp,
            commander_level: self.commander_level,
            highest_wave: self.highest_wave,
        }
    }
}

/// A player's persistent account state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub inventory: Inventory,
    pub progression: Progression,
    pub unlocked_heroes: Vec<HeroKind>,
    pub unlocked_turrets: Vec<TurretKind>,
    pub unlocked_pillars: Vec<Pillar>,
}

impl Profile {
    /// A fresh account with the starter unlocks.
    pub fn starter(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            inventory: Inventory::default(),
            progression: Progression::default(),
            unlocked_heroes: vec![HeroKind::Pyromancer],
            unlocked_turrets: vec![TurretKind::Flamethrower],
            unlocked_pillars: vec![Pillar::Streets],
        }
    }
}

/// The player's chosen setup for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loadout {
    pub fortress_class: FortressClass,
    pub heroes: Vec<HeroKind>,
    pub turrets: Vec<TurretPlacement>,
    pub equipped_artifacts: Vec<ArtifactKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub user_id: String,
    pub session_seed: u32,
    pub loadout: Loadout,
    pub last_verified_wave: u32,
    /// Relics held at `last_verified_wave`.
    pub relics: Vec<RelicKind>,
    pub active: bool,
    pub started_at_ms: u64,
}

/// Verified reward delta for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentCommit {
    pub end_wave: u32,
    pub relics: Vec<RelicKind>,
    pub gold: u64,
    pub dust: u64,
    pub xp: u64,
    pub materials: BTreeMap<MaterialKind, u32>,
    pub artifacts: Vec<ArtifactKind>,
    /// The run ended in this segment; no further segments are accepted.
    pub closes_session: bool,
}

/// Sanitised partial rewards credited when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionEndCommit {
    pub final_wave: u32,
    pub gold: u64,
    pub dust: u64,
    pub xp: u64,
}

/// Inventory and progression after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub inventory: Inventory,
    pub progression: Progression,
}

// ============================================================================
// Store Trait
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session {0} already exists")]
    DuplicateSession(SessionId),

    #[error("session {0} is no longer active")]
    SessionNotActive(SessionId),

    #[error("last verified wave moved: expected {expected}, found {actual}")]
    Conflict { expected: u32, actual: u32 },
}

pub trait ProgressStore: Send + Sync {
    fn profile(&self, user_id: &str) -> Result<Profile, StoreError>;

    fn create_session(&self, record: SessionRecord) -> Result<(), StoreError>;

    fn session(&self, session_id: &str) -> Result<SessionRecord, StoreError>;

    /// Credit `commit` and advance `last_verified_wave` to `commit.end_wave`,
    /// atomically, only if it still equals `expected_start_wave`.
    fn commit_segment(
        &self,
        session_id: &str,
        expected_start_wave: u32,
        commit: &SegmentCommit,
    ) -> Result<Balances, StoreError>;

    /// Credit partial rewards and mark the session inactive.
    fn end_session(
        &self,
        session_id: &str,
        commit: &SessionEndCommit,
    ) -> Result<Balances, StoreError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    profiles: BTreeMap<String, Profile>,
    sessions: BTreeMap<SessionId, SessionRecord>,
}

impl Tables {
    /// Session and its owner's profile, both mutable.
    fn session_and_profile(
        &mut self,
        session_id: &str,
    ) -> Result<(&mut SessionRecord, &mut Profile), StoreError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
        let profile = self
            .profiles
            .get_mut(&session.user_id)
            .ok_or_else(|| StoreError::UnknownUser(session.user_id.clone()))?;
        Ok((session, profile))
    }
}

/// Single-process store. One mutex covers every table, so each commit is
/// serialisable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.user_id.clone(), profile);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressStore for MemoryStore {
    fn profile(&self, user_id: &str) -> Result<Profile, StoreError> {
        self.lock()
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
    }

    fn create_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.profiles.contains_key(&record.user_id) {
            return Err(StoreError::UnknownUser(record.user_id));
        }
        if tables.sessions.contains_key(&record.session_id) {
            return Err(StoreError::DuplicateSession(record.session_id));
        }
        tables.sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    fn session(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        self.lock()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    fn commit_segment(
        &self,
        session_id: &str,
        expected_start_wave: u32,
        commit: &SegmentCommit,
    ) -> Result<Balances, StoreError> {
        let mut tables = self.lock();
        let (session, profile) = tables.session_and_profile(session_id)?;
        if !session.active {
            return Err(StoreError::SessionNotActive(session.session_id.clone()));
        }
        if session.last_verified_wave != expected_start_wave {
            return Err(StoreError::Conflict {
                expected: expected_start_wave,
                actual: session.last_verified_wave,
            });
        }

        let inventory = &mut profile.inventory;
        inventory.gold = inventory.gold.saturating_add(commit.gold);
        inventory.dust = inventory.dust.saturating_add(commit.dust);
        for (material, amount) in &commit.materials {
            let held = inventory.materials.entry(*material).or_insert(0);
            *held = held.saturating_add(*amount);
        }
        inventory.artifacts.extend_from_slice(&commit.artifacts);
        profile.progression.add_xp(commit.xp);
        profile.progression.highest_wave = profile.progression.highest_wave.max(commit.end_wave);

        session.last_verified_wave = commit.end_wave;
        session.relics = commit.relics.clone();
        if commit.closes_session {
            session.active = false;
        }

        Ok(Balances {
            inventory: profile.inventory.clone(),
            progression: profile.progression,
        })
    }

    fn end_session(
        &self,
        session_id: &str,
        commit: &SessionEndCommit,
    ) -> Result<Balances, StoreError> {
        let mut tables = self.lock();
        let (session, profile) = tables.session_and_profile(session_id)?;
        if !session.active {
            return Err(StoreError::SessionNotActive(session.session_id.clone()));
        }

        let inventory = &mut profile.inventory;
        inventory.gold = inventory.gold.saturating_add(commit.gold);
        inventory.dust = inventory.dust.saturating_add(commit.dust);
        profile.progression.add_xp(commit.xp);
        profile.progression.highest_wave = profile.progression.highest_wave.max(commit.final_wave);
        session.active = false;

        Ok(Balances {
            inventory: profile.inventory.clone(),
            progression: profile.progression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_session() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_profile(Profile::starter("u"));
        store
            .create_session(SessionRecord {
                session_id: "s".to_string(),
                user_id: "u".to_string(),
                session_seed: 1,
                loadout: Loadout {
                    fortress_class: FortressClass::Fire,
                    heroes: vec![],
                    turrets: vec![],
                    equipped_artifacts: vec![],
                },
                last_verified_wave: 0,
                relics: vec![],
                active: true,
                started_at_ms: 0,
            })
            .unwrap();
        store
    }

    fn commit(end_wave: u32, gold: u64) -> SegmentCommit {
        SegmentCommit {
            end_wave,
            gold,
            xp: 600,
            materials: BTreeMap::from([(MaterialKind::Scrap, 2)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_advances_wave_and_credits() {
        let store = store_with_session();
        let balances = store.commit_segment("s", 0, &commit(5, 120)).unwrap();
        assert_eq!(balances.inventory.gold, 120);
        assert_eq!(balances.inventory.materials.get(&MaterialKind::Scrap), Some(&2));
        assert_eq!(balances.progression.highest_wave, 5);
        assert_eq!(store.session("s").unwrap().last_verified_wave, 5);
    }

    #[test]
    fn test_stale_commit_conflicts_without_crediting() {
        let store = store_with_session();
        store.commit_segment("s", 0, &commit(5, 120)).unwrap();
        assert_eq!(
            store.commit_segment("s", 0, &commit(5, 120)),
            Err(StoreError::Conflict {
                expected: 0,
                actual: 5
            })
        );
        assert_eq!(store.profile("u").unwrap().inventory.gold, 120);
    }

    #[test]
    fn test_level_follows_xp() {
        let store = store_with_session();
        store.commit_segment("s", 0, &commit(5, 0)).unwrap();
        let balances = store.commit_segment("s", 5, &commit(10, 0)).unwrap();
        assert_eq!(balances.progression.total_xp, 1_200);
        assert_eq!(balances.progression.commander_level, 2);
        assert_eq!(Progression::level_for_xp(u64::MAX), MAX_COMMANDER_LEVEL);
    }

    #[test]
    fn test_end_session_deactivates() {
        let store = store_with_session();
        let end = SessionEndCommit {
            final_wave: 3,
            gold: 10,
            ..Default::default()
        };
        store.end_session("s", &end).unwrap();
        assert!(!store.session("s").unwrap().active);
        assert_eq!(
            store.end_session("s", &end),
            Err(StoreError::SessionNotActive("s".to_string()))
        );
        assert!(matches!(
            store.commit_segment("s", 0, &commit(5, 1)),
            Err(StoreError::SessionNotActive(_))
        ));
    }
}
