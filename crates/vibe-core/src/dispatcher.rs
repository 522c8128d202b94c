//! Event dispatcher and tick scheduler.
//!
//! The [`Dispatcher`] maps each [`EventKind`] to an ordered list of
//! registered [`EventHandler`]s and delivers events to them synchronously, in
//! registration order. One dispatcher is owned by each agent facade; there is
//! no process-wide handler table.
//!
//! # Gating
//!
//! Delivery is suspended entirely while the *handlers enabled* flag is off
//! (between a disconnect and the next connect), and tick delivery is further
//! suspended while the *ticks active* flag is off (connected but not yet past
//! spawn activation). Both flags are re-checked before every handler, so a
//! handler that disconnects the agent stops delivery to the handlers after it.
//!
//! # Failure isolation
//!
//! Handlers return a [`HandlerResult`]. A failure is logged with the handler
//! name and event kind and counted in the [`DispatchReport`]; it never stops
//! delivery to the remaining handlers and never propagates to the caller.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};
use vibe_types::{Event, EventKind, PhysicsTick, TickSlot};

use crate::clock::TickCounter;
use crate::connection::ConnectionError;

/// What a handler did with an event it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler performed its work.
    Acted,
    /// The handler had nothing to do (wrong slot, nothing to react to).
    Idle,
}

/// A recoverable failure inside a single handler invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The agent has no live connection.
    #[error("agent is not connected")]
    NotConnected,

    /// A piece of agent state could not be read.
    #[error("{what} is unavailable")]
    Unavailable {
        /// The state that could not be read.
        what: &'static str,
    },

    /// An agent command failed.
    #[error("agent command failed: {source}")]
    Agent {
        /// The underlying facade error.
        #[from]
        source: crate::agent::AgentError,
    },

    /// The connection collaborator reported an error.
    #[error("connection error: {source}")]
    Connection {
        /// The underlying connection error.
        #[from]
        source: ConnectionError,
    },
}

/// Result returned by every handler invocation.
pub type HandlerResult = Result<Outcome, HandlerError>;

/// A unit of reactive logic registered for one event kind.
pub trait EventHandler: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Handle one event. Must not block: it runs inside tick delivery.
    fn handle(&self, event: &Event) -> HandlerResult;
}

/// Handle returned by [`Dispatcher::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

/// Summary of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers invoked.
    pub delivered: usize,
    /// Handlers that returned [`Outcome::Acted`].
    pub acted: usize,
    /// Handlers that returned an error.
    pub failed: usize,
    /// Whether delivery was cut short (or never started) by a gate flag.
    pub gated: bool,
}

struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

/// Per-agent handler table with delivery gating and the tick scheduler.
pub struct Dispatcher {
    handlers: Mutex<BTreeMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
    handlers_enabled: AtomicBool,
    ticks_active: AtomicBool,
    counter: Mutex<TickCounter>,
    offsets: Mutex<BTreeMap<TickSlot, Vec<String>>>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers_enabled", &self.handlers_enabled())
            .field("ticks_active", &self.ticks_active())
            .field("tick", &self.current_slot())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dispatcher {
    /// An empty dispatcher with handlers enabled and ticks inactive.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            handlers_enabled: AtomicBool::new(true),
            ticks_active: AtomicBool::new(false),
            counter: Mutex::new(TickCounter::new()),
            offsets: Mutex::new(BTreeMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Append `handler` to the list for `kind`. Registering the same handler
    /// twice yields two entries with distinct ids.
    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(event = %kind, handler = handler.name(), ?id, "Handler registered");
        lock(&self.handlers)
            .entry(kind)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove the entry with `id` from the list for `kind`. Returns whether
    /// an entry was removed; unknown ids are a no-op.
    pub fn unregister(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut table = lock(&self.handlers);
        let Some(list) = table.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        let removed = list.remove(pos);
        if list.is_empty() {
            table.remove(&kind);
        }
        debug!(event = %kind, handler = removed.handler.name(), ?id, "Handler unregistered");
        true
    }

    /// Whether `id` is currently registered for `kind`.
    pub fn is_registered(&self, kind: EventKind, id: HandlerId) -> bool {
        lock(&self.handlers)
            .get(&kind)
            .is_some_and(|list| list.iter().any(|r| r.id == id))
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        lock(&self.handlers).get(&kind).map_or(0, Vec::len)
    }

    /// Names of the handlers registered for `kind`, in delivery order.
    pub fn handler_names(&self, kind: EventKind) -> Vec<String> {
        lock(&self.handlers).get(&kind).map_or_else(Vec::new, |list| {
            list.iter().map(|r| r.handler.name().to_owned()).collect()
        })
    }

    // -----------------------------------------------------------------------
    // Tick offsets
    // -----------------------------------------------------------------------

    /// Record that `owner` does its work on `slot`. Returns `false` (and logs
    /// a warning) when another owner already claimed the slot; the claim is
    /// recorded either way.
    pub fn claim_offset(&self, slot: TickSlot, owner: &str) -> bool {
        let mut offsets = lock(&self.offsets);
        let owners = offsets.entry(slot).or_default();
        let clear = owners.iter().all(|o| o == owner);
        if !clear {
            warn!(
                slot = slot.value(),
                owner,
                existing = ?owners,
                "Tick offset already claimed; both behaviors will run on the same tick"
            );
        }
        owners.push(owner.to_owned());
        clear
    }

    /// Drop one claim by `owner` on `slot`.
    pub fn release_offset(&self, slot: TickSlot, owner: &str) {
        let mut offsets = lock(&self.offsets);
        if let Some(owners) = offsets.get_mut(&slot) {
            if let Some(pos) = owners.iter().position(|o| o == owner) {
                owners.remove(pos);
            }
            if owners.is_empty() {
                offsets.remove(&slot);
            }
        }
    }

    /// Current owners of `slot`.
    pub fn offset_owners(&self, slot: TickSlot) -> Vec<String> {
        lock(&self.offsets).get(&slot).cloned().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Gate flags
    // -----------------------------------------------------------------------

    /// Whether any delivery happens at all.
    pub fn handlers_enabled(&self) -> bool {
        self.handlers_enabled.load(Ordering::Acquire)
    }

    /// Enable or disable all delivery.
    pub fn set_handlers_enabled(&self, enabled: bool) {
        self.handlers_enabled.store(enabled, Ordering::Release);
    }

    /// Whether tick events are delivered.
    pub fn ticks_active(&self) -> bool {
        self.ticks_active.load(Ordering::Acquire)
    }

    /// Enable or disable tick delivery.
    pub fn set_ticks_active(&self, active: bool) {
        self.ticks_active.store(active, Ordering::Release);
    }

    fn gated(&self, kind: EventKind) -> bool {
        !self.handlers_enabled() || (kind == EventKind::Tick && !self.ticks_active())
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Slot carried by the most recent physics tick.
    pub fn current_slot(&self) -> TickSlot {
        lock(&self.counter).current()
    }

    /// Physics ticks observed since the counter was last reset.
    pub fn ticks_observed(&self) -> u64 {
        lock(&self.counter).observed()
    }

    /// Return the tick counter to slot zero.
    pub fn reset_ticks(&self) {
        lock(&self.counter).reset();
    }

    /// Advance the tick counter, stamp the tick with the new slot, and
    /// dispatch it. The counter advances even while tick delivery is gated.
    pub fn dispatch_tick(&self, physics: PhysicsTick) -> DispatchReport {
        let slot = lock(&self.counter).advance();
        self.dispatch(&Event::tick(slot, physics.sequence))
    }

    /// Deliver `event` to every handler registered for its kind, in
    /// registration order.
    ///
    /// The handler list is snapshotted before delivery so handlers may
    /// register or unregister while being dispatched; a handler removed by an
    /// earlier handler in the same dispatch is not invoked.
    pub fn dispatch(&self, event: &Event) -> DispatchReport {
        let kind = event.kind();
        let mut report = DispatchReport::default();

        let snapshot: Vec<(HandlerId, Arc<dyn EventHandler>)> = lock(&self.handlers)
            .get(&kind)
            .map(|list| list.iter().map(|r| (r.id, Arc::clone(&r.handler))).collect())
            .unwrap_or_default();

        for (id, handler) in snapshot {
            if self.gated(kind) {
                debug!(event = %kind, "Skipping event, handlers disabled");
                report.gated = true;
                return report;
            }
            if !self.is_registered(kind, id) {
                continue;
            }

            report.delivered = report.delivered.saturating_add(1);
            match handler.handle(event) {
                Ok(Outcome::Acted) => report.acted = report.acted.saturating_add(1),
                Ok(Outcome::Idle) => {}
                Err(err) => {
                    report.failed = report.failed.saturating_add(1);
                    error!(event = %kind, handler = handler.name(), %err, "Error in event handler");
                }
            }
        }

        if report.delivered == 0 && self.gated(kind) {
            report.gated = true;
        }
        report
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
