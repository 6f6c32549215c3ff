//! Player input events and the per-simulation event queue.
//!
//! Events are the only outside input a simulation accepts. They are
//! scheduled for a tick and applied at the start of that tick, ordered by
//! tick and then by submission order.

use thiserror::Error;

use crate::Tick;
use crate::content::{LANE_COUNT, RELIC_CHOICES, WALL_MAX_X, WALL_MIN_X};
use crate::fixed::Fp;
use crate::state::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Take option `index` from the open relic window.
    ChooseRelic { index: u8 },
    /// Spend gold to redraw the open relic window.
    RerollRelics,
    ActivateHeroSkill { hero_id: EntityId },
    PlaceWall { lane: u8, x: Fp },
    DeployMilitia { lane: u8 },
    /// Endless mode only: resume from a lost state.
    Retry,
}

impl GameEvent {
    /// Stable wire discriminant.
    pub const fn kind(&self) -> u32 {
        match self {
            Self::ChooseRelic { .. } => 0,
            Self::RerollRelics => 1,
            Self::ActivateHeroSkill { .. } => 2,
            Self::PlaceWall { .. } => 3,
            Self::DeployMilitia { .. } => 4,
            Self::Retry => 5,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChooseRelic { .. } => "choose_relic",
            Self::RerollRelics => "reroll_relics",
            Self::ActivateHeroSkill { .. } => "activate_hero_skill",
            Self::PlaceWall { .. } => "place_wall",
            Self::DeployMilitia { .. } => "deploy_militia",
            Self::Retry => "retry",
        }
    }

    /// Structural checks that don't depend on game state.
    pub fn validate(&self) -> Result<(), EventError> {
        match *self {
            Self::ChooseRelic { index } if usize::from(index) >= RELIC_CHOICES => {
                Err(EventError::RelicIndexOutOfRange(index))
            }
            Self::PlaceWall { lane, .. } | Self::DeployMilitia { lane } if lane >= LANE_COUNT => {
                Err(EventError::InvalidLane(lane))
            }
            Self::PlaceWall { x, .. } if !(WALL_MIN_X..=WALL_MAX_X).contains(&x) => {
                Err(EventError::WallOutOfRange(x))
            }
            _ => Ok(()),
        }
    }
}

/// An event scheduled for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: Tick,
    pub event: GameEvent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("relic choice index {0} is out of range")]
    RelicIndexOutOfRange(u8),

    #[error("lane {0} does not exist")]
    InvalidLane(u8),

    #[error("wall x {0} is outside the buildable range")]
    WallOutOfRange(Fp),

    #[error("event scheduled for tick {event_tick} but the simulation is at tick {current_tick}")]
    InPast { event_tick: Tick, current_tick: Tick },

    #[error("event ticks are not non-decreasing at index {index}")]
    OutOfOrder { index: usize },

    #[error("unknown event kind {0}")]
    UnknownKind(u32),
}

/// Pending events, kept sorted by tick with submission order preserved
/// among events on the same tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQueue {
    pending: Vec<TimedEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every pending event with a tick `<=` this one.
    pub fn push(&mut self, timed: TimedEvent) {
        let at = self.pending.partition_point(|e| e.tick <= timed.tick);
        self.pending.insert(at, timed);
    }

    /// Remove and return every event due at or before `tick`, in order.
    pub fn drain_due(&mut self, tick: Tick) -> Vec<GameEvent> {
        let due = self.pending.partition_point(|e| e.tick <= tick);
        self.pending.drain(..due).map(|e| e.event).collect()
    }

    pub fn has_pending(&self, pred: impl Fn(&GameEvent) -> bool) -> bool {
        self.pending.iter().any(|e| pred(&e.event))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedEvent> {
        self.pending.iter()
    }
}

/// Check a submitted event list is in non-decreasing tick order and every
/// event is structurally valid.
pub fn validate_event_list(events: &[TimedEvent]) -> Result<(), EventError> {
    for (index, pair) in events.windows(2).enumerate() {
        if pair[1].tick < pair[0].tick {
            return Err(EventError::OutOfOrder { index: index + 1 });
        }
    }
    events.iter().try_for_each(|e| e.event.validate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::from_int;

    fn at(tick: Tick, event: GameEvent) -> TimedEvent {
        TimedEvent { tick, event }
    }

    #[test]
    fn test_queue_orders_by_tick_then_submission() {
        let mut queue = EventQueue::new();
        queue.push(at(5, GameEvent::DeployMilitia { lane: 0 }));
        queue.push(at(3, GameEvent::RerollRelics));
        queue.push(at(5, GameEvent::DeployMilitia { lane: 2 }));
        queue.push(at(3, GameEvent::ChooseRelic { index: 1 }));

        assert_eq!(
            queue.drain_due(4),
            vec![GameEvent::RerollRelics, GameEvent::ChooseRelic { index: 1 }]
        );
        assert_eq!(
            queue.drain_due(5),
            vec![
                GameEvent::DeployMilitia { lane: 0 },
                GameEvent::DeployMilitia { lane: 2 }
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_leaves_future_events() {
        let mut queue = EventQueue::new();
        queue.push(at(10, GameEvent::Retry));
        assert!(queue.drain_due(9).is_empty());
        assert!(queue.has_pending(|e| matches!(e, GameEvent::Retry)));
        assert_eq!(queue.drain_due(10), vec![GameEvent::Retry]);
    }

    #[test]
    fn test_event_validation() {
        assert_eq!(
            GameEvent::ChooseRelic { index: 3 }.validate(),
            Err(EventError::RelicIndexOutOfRange(3))
        );
        assert_eq!(
            GameEvent::DeployMilitia { lane: 3 }.validate(),
            Err(EventError::InvalidLane(3))
        );
        assert_eq!(
            GameEvent::PlaceWall {
                lane: 1,
                x: from_int(2)
            }
            .validate(),
            Err(EventError::WallOutOfRange(from_int(2)))
        );
        assert!(
            GameEvent::PlaceWall {
                lane: 1,
                x: from_int(12)
            }
            .validate()
            .is_ok()
        );
    }

    #[test]
    fn test_event_list_must_be_ordered() {
        let events = [at(4, GameEvent::RerollRelics), at(2, GameEvent::RerollRelics)];
        assert_eq!(
            validate_event_list(&events),
            Err(EventError::OutOfOrder { index: 1 })
        );
        let same_tick = [at(4, GameEvent::RerollRelics), at(4, GameEvent::Retry)];
        assert!(validate_event_list(&same_tick).is_ok());
    }
}
