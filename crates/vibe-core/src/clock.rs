//! Bounded tick counter for the dispatcher's tick scheduler.
//!
//! The counter is the single source of truth for which slot of the 20-tick
//! window the current physics tick occupies. It is advanced exactly once per
//! physics tick, *before* the tick is dispatched, so a behavior keyed to slot
//! K observes exactly one tick per window carrying K.
//!
//! The counter keeps advancing while tick delivery is suspended (before
//! spawn activation), so slots stay aligned with the environment's tick
//! stream rather than with the first delivered tick.

use vibe_types::{TICKS_PER_WINDOW, TickSlot};

/// Cycling tick counter in `[0, 20)` plus a running total of ticks observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickCounter {
    /// Slot of the most recent tick.
    slot: TickSlot,
    /// Physics ticks observed since the last reset.
    observed: u64,
}

impl TickCounter {
    /// A counter at slot zero with nothing observed.
    pub const fn new() -> Self {
        Self {
            slot: TickSlot::ZERO,
            observed: 0,
        }
    }

    /// Advance to the next slot, wrapping to zero at the window edge, and
    /// return the slot the new tick carries.
    pub const fn advance(&mut self) -> TickSlot {
        self.slot = self.slot.next();
        self.observed = self.observed.saturating_add(1);
        self.slot
    }

    /// Slot of the most recent tick.
    pub const fn current(&self) -> TickSlot {
        self.slot
    }

    /// Physics ticks observed since the last reset.
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// Number of complete 20-tick windows observed since the last reset.
    pub fn windows(&self) -> u64 {
        self.observed
            .checked_div(u64::from(TICKS_PER_WINDOW))
            .unwrap_or(0)
    }

    /// Return to slot zero (called when a new connection starts).
    pub const fn reset(&mut self) {
        self.slot = TickSlot::ZERO;
        self.observed = 0;
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}
