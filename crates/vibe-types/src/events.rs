//! Environment events and the events the dispatcher delivers to handlers.
//!
//! The environment emits [`EnvironmentEvent`]s. The agent facade turns each
//! one into an [`Event`]; physics ticks are stamped with a [`TickSlot`] on the
//! way through so behaviors can pick a fixed slot inside every 20-tick window.

use serde::{Deserialize, Serialize};

use crate::enums::EventKind;

/// Number of ticks in one scheduling window (about one second of game time).
pub const TICKS_PER_WINDOW: u8 = 20;

/// Errors constructing a [`TickSlot`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickSlotError {
    /// The value is not in `0..TICKS_PER_WINDOW`.
    #[error("tick slot {value} out of range (must be below {TICKS_PER_WINDOW})")]
    OutOfRange {
        /// The rejected value.
        value: u8,
    },
}

/// A position inside the 20-tick scheduling window, always in `[0, 20)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TickSlot(u8);

impl TickSlot {
    /// Slot zero, the value a window starts and wraps to.
    pub const ZERO: Self = Self(0);

    /// Create a slot, rejecting values outside the window.
    pub const fn new(value: u8) -> Result<Self, TickSlotError> {
        if value < TICKS_PER_WINDOW {
            Ok(Self(value))
        } else {
            Err(TickSlotError::OutOfRange { value })
        }
    }

    /// The raw slot value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The slot after this one, wrapping back to zero at the window edge.
    #[must_use]
    pub const fn next(self) -> Self {
        let next = self.0.saturating_add(1);
        if next >= TICKS_PER_WINDOW {
            Self::ZERO
        } else {
            Self(next)
        }
    }
}

impl TryFrom<u8> for TickSlot {
    type Error = TickSlotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TickSlot> for u8 {
    fn from(slot: TickSlot) -> Self {
        slot.0
    }
}

impl core::fmt::Display for TickSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw physics tick payload from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsTick {
    /// Monotonic tick sequence number assigned by the environment.
    pub sequence: u64,
}

/// A physics tick as delivered to handlers: the raw payload plus its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    /// Slot of this tick inside the current scheduling window.
    pub slot: TickSlot,
    /// The raw environment payload.
    pub physics: PhysicsTick,
}

/// A notification produced by the external connection collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentEvent {
    /// Login completed.
    Login,
    /// The agent spawned.
    Spawn,
    /// The agent was kicked.
    Kicked {
        /// Server-provided reason.
        reason: String,
    },
    /// The agent died.
    Death,
    /// A chat line arrived.
    Chat {
        /// Plain-text message.
        message: String,
    },
    /// Health or food changed.
    Health {
        /// Current health (0-20).
        health: f32,
        /// Current food level (0-20).
        food: u32,
    },
    /// A physics tick elapsed.
    PhysicsTick(PhysicsTick),
    /// The connection ended.
    End {
        /// Reason, when the environment reports one.
        reason: Option<String>,
    },
}

impl EnvironmentEvent {
    /// The handler-table key this event is delivered under.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Login => EventKind::Login,
            Self::Spawn => EventKind::Spawn,
            Self::Kicked { .. } => EventKind::Kicked,
            Self::Death => EventKind::Death,
            Self::Chat { .. } => EventKind::Chat,
            Self::Health { .. } => EventKind::Health,
            Self::PhysicsTick(_) => EventKind::Tick,
            Self::End { .. } => EventKind::End,
        }
    }
}

/// An event as delivered to registered handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Login completed.
    Login,
    /// The agent spawned.
    Spawn,
    /// The agent was kicked.
    Kicked {
        /// Server-provided reason.
        reason: String,
    },
    /// The agent died.
    Death,
    /// A chat line arrived.
    Chat {
        /// Plain-text message.
        message: String,
    },
    /// Health or food changed.
    Health {
        /// Current health (0-20).
        health: f32,
        /// Current food level (0-20).
        food: u32,
    },
    /// A physics tick, stamped with its slot.
    Tick(TickEvent),
    /// The connection ended.
    End {
        /// Reason, when the environment reports one.
        reason: Option<String>,
    },
}

impl Event {
    /// The handler-table key this event is delivered under.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Login => EventKind::Login,
            Self::Spawn => EventKind::Spawn,
            Self::Kicked { .. } => EventKind::Kicked,
            Self::Death => EventKind::Death,
            Self::Chat { .. } => EventKind::Chat,
            Self::Health { .. } => EventKind::Health,
            Self::Tick(_) => EventKind::Tick,
            Self::End { .. } => EventKind::End,
        }
    }

    /// The tick slot, for tick events.
    pub const fn tick_slot(&self) -> Option<TickSlot> {
        match self {
            Self::Tick(tick) => Some(tick.slot),
            _ => None,
        }
    }

    /// Whether this is a tick event landing exactly on `slot`.
    pub fn lands_on(&self, slot: TickSlot) -> bool {
        self.tick_slot() == Some(slot)
    }

    /// Build a tick event for `slot` with the given sequence number.
    pub const fn tick(slot: TickSlot, sequence: u64) -> Self {
        Self::Tick(TickEvent {
            slot,
            physics: PhysicsTick { sequence },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slot_rejects_out_of_range_values() {
        assert!(TickSlot::new(19).is_ok());
        assert_eq!(
            TickSlot::new(20),
            Err(TickSlotError::OutOfRange { value: 20 })
        );
    }

    #[test]
    fn slot_wraps_at_window_edge() {
        let last = TickSlot::new(19).unwrap();
        assert_eq!(last.next(), TickSlot::ZERO);
        assert_eq!(TickSlot::ZERO.next().value(), 1);
    }

    #[test]
    fn slot_deserializes_with_range_check() {
        let ok: Result<TickSlot, _> = serde_json::from_str("18");
        assert_eq!(ok.unwrap().value(), 18);
        let bad: Result<TickSlot, _> = serde_json::from_str("25");
        assert!(bad.is_err());
    }

    #[test]
    fn lands_on_only_matches_tick_events() {
        let slot = TickSlot::new(7).unwrap();
        assert!(Event::tick(slot, 1).lands_on(slot));
        assert!(!Event::tick(TickSlot::ZERO, 1).lands_on(slot));
        assert!(!Event::Spawn.lands_on(slot));
    }

    #[test]
    fn kinds_match_between_environment_and_dispatch() {
        assert_eq!(
            EnvironmentEvent::PhysicsTick(PhysicsTick { sequence: 3 }).kind(),
            Event::tick(TickSlot::ZERO, 3).kind()
        );
        assert_eq!(EnvironmentEvent::Spawn.kind(), Event::Spawn.kind());
    }
}
