//! Behavior lifecycle: attaching reactive logic to the event stream.
//!
//! A [`Behavior`] is a named unit of reactive logic with a single
//! [`run_once`](Behavior::run_once) step. An [`Action`] wraps a behavior and
//! owns its attachment to a [`Dispatcher`]: *detached* on construction,
//! *attached* after [`Action::start`], *detached* again after
//! [`Action::stop`]. Both transitions are idempotent, so a double start never
//! registers a duplicate handler.
//!
//! Tick-bound behaviors that declare a [`tick_offset`](Behavior::tick_offset)
//! only have `run_once` called on ticks whose slot equals the offset; every
//! other tick returns [`Outcome::Idle`] without touching the behavior.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, info};
use vibe_types::{Event, EventKind, TickSlot};

use crate::dispatcher::{Dispatcher, EventHandler, HandlerId, HandlerResult, Outcome};

/// A single reactive unit of logic bound to at most one event kind.
pub trait Behavior: Send + 'static {
    /// Display name, used in logs and offset claims.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// Event kind the behavior runs on. `None` means it is driven externally
    /// and start/stop do nothing at the dispatcher level.
    fn run_event(&self) -> Option<EventKind> {
        Some(EventKind::Tick)
    }

    /// Slot of the 20-tick window the behavior does its work on. `None`
    /// means every delivered event.
    fn tick_offset(&self) -> Option<TickSlot> {
        None
    }

    /// Perform one step in response to `event`.
    fn run_once(&mut self, event: &Event) -> HandlerResult;

    /// Release anything the behavior holds exclusively. Called on every
    /// [`Action::stop`], so it must be idempotent.
    fn on_stop(&mut self) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatcher-facing adapter: applies offset gating and serializes calls.
struct BehaviorHandler<B> {
    name: &'static str,
    offset: Option<TickSlot>,
    behavior: Arc<Mutex<B>>,
}

impl<B: Behavior> EventHandler for BehaviorHandler<B> {
    fn name(&self) -> &str {
        self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        if let (Some(offset), Some(slot)) = (self.offset, event.tick_slot())
            && slot != offset
        {
            return Ok(Outcome::Idle);
        }
        let mut behavior = match self.behavior.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!(behavior = self.name, "Behavior busy, skipping re-entrant event");
                return Ok(Outcome::Idle);
            }
        };
        behavior.run_once(event)
    }
}

#[derive(Debug, Clone, Copy)]
struct Attachment {
    kind: EventKind,
    id: HandlerId,
}

/// A behavior plus its attachment to a dispatcher.
pub struct Action<B: Behavior> {
    name: &'static str,
    run_event: Option<EventKind>,
    offset: Option<TickSlot>,
    behavior: Arc<Mutex<B>>,
    dispatcher: Arc<Dispatcher>,
    attachment: Mutex<Option<Attachment>>,
}

impl<B: Behavior> core::fmt::Debug for Action<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("run_event", &self.run_event)
            .field("offset", &self.offset)
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl<B: Behavior> Action<B> {
    /// Wrap `behavior`, detached, for `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>, behavior: B) -> Self {
        Self {
            name: behavior.name(),
            run_event: behavior.run_event(),
            offset: behavior.tick_offset(),
            behavior: Arc::new(Mutex::new(behavior)),
            dispatcher,
            attachment: Mutex::new(None),
        }
    }

    /// The behavior's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Attach the behavior's handler. Returns `true` if this call attached
    /// it, `false` if it was already attached or has no event binding.
    pub fn start(&self) -> bool {
        let Some(kind) = self.run_event else {
            return false;
        };
        let mut attachment = lock(&self.attachment);
        if attachment.is_some() {
            debug!(behavior = self.name, "Already attached");
            return false;
        }
        if let Some(offset) = self.offset {
            self.dispatcher.claim_offset(offset, self.name);
        }
        let handler = Arc::new(BehaviorHandler {
            name: self.name,
            offset: self.offset,
            behavior: Arc::clone(&self.behavior),
        });
        let id = self.dispatcher.register(kind, handler);
        *attachment = Some(Attachment { kind, id });
        info!(behavior = self.name, event = %kind, offset = ?self.offset.map(TickSlot::value), "Behavior started");
        true
    }

    /// Detach the handler and let the behavior release what it holds.
    /// Callable from any state; returns whether a handler was detached.
    pub fn stop(&self) -> bool {
        let detached = self.detach();
        lock(&self.behavior).on_stop();
        if detached {
            info!(behavior = self.name, "Behavior stopped");
        }
        detached
    }

    fn detach(&self) -> bool {
        let Some(Attachment { kind, id }) = lock(&self.attachment).take() else {
            return false;
        };
        self.dispatcher.unregister(kind, id);
        if let Some(offset) = self.offset {
            self.dispatcher.release_offset(offset, self.name);
        }
        true
    }

    /// Whether the handler is currently registered.
    pub fn is_attached(&self) -> bool {
        lock(&self.attachment).is_some()
    }

    /// Run `f` with exclusive access to the behavior.
    pub fn with_behavior<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut lock(&self.behavior))
    }
}

impl<B: Behavior> Drop for Action<B> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Type-erased lifecycle handle, so strategies can own a mixed set of
/// actions.
pub trait Attachable: Send + Sync {
    /// The behavior's name.
    fn name(&self) -> &'static str;

    /// See [`Action::start`].
    fn start(&self) -> bool;

    /// See [`Action::stop`].
    fn stop(&self) -> bool;

    /// See [`Action::is_attached`].
    fn is_attached(&self) -> bool;
}

impl<B: Behavior> Attachable for Action<B> {
    fn name(&self) -> &'static str {
        Self::name(self)
    }

    fn start(&self) -> bool {
        Self::start(self)
    }

    fn stop(&self) -> bool {
        Self::stop(self)
    }

    fn is_attached(&self) -> bool {
        Self::is_attached(self)
    }
}
