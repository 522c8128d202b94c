//! Strategies: composition of behaviors into a goal-directed plan.
//!
//! A [`Strategy`] is started once and stopped at most once. Reactive
//! strategies start a set of actions and return; procedural strategies run
//! an async loop in a background task. Either way [`Strategy::finished`]
//! resolves when the strategy has stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;
use vibe_types::RunId;

/// Errors starting a strategy.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// `start` was called on a strategy that already started.
    #[error("strategy {name} was already started")]
    AlreadyStarted {
        /// Strategy name.
        name: &'static str,
    },

    /// The strategy's parameters are unusable.
    #[error("invalid strategy parameters: {reason}")]
    InvalidParameters {
        /// What is wrong.
        reason: String,
    },

    /// A procedural strategy needs a tokio runtime to run in.
    #[error("no async runtime available")]
    NoRuntime,
}

/// A plan that drives the agent toward a goal.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Display name.
    fn name(&self) -> &'static str;

    /// Begin executing.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::AlreadyStarted`] on a second call, or a
    /// strategy-specific start error.
    fn start(self: Arc<Self>) -> Result<(), StrategyError>;

    /// Stop executing and release everything held. Idempotent.
    fn stop(&self);

    /// Whether the strategy is running.
    fn is_running(&self) -> bool;

    /// Resolve once the strategy has stopped, for whatever reason.
    async fn finished(&self);
}

impl std::fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name()).finish()
    }
}

/// Run flags shared by strategy implementations.
#[derive(Debug, Default)]
pub struct RunState {
    id: RunId,
    started: AtomicBool,
    running: AtomicBool,
    done: Notify,
}

impl RunState {
    /// A fresh, never-started state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the strategy started and running.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::AlreadyStarted`] if it was started before.
    pub fn begin(&self, name: &'static str) -> Result<(), StrategyError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StrategyError::AlreadyStarted { name });
        }
        self.running.store(true, Ordering::Release);
        debug!(strategy = name, run = %self.id, "Strategy run began");
        Ok(())
    }

    /// Identifier for this run, for correlating log lines.
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Mark the strategy stopped and wake [`finished`](Self::finished)
    /// waiters. Returns whether this call did the transition.
    pub fn finish(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.done.notify_waiters();
        was_running
    }

    /// Whether the strategy is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether `begin` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Resolve once the strategy has started and stopped.
    pub async fn finished(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_started() && !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`, waking early if the strategy stops. Returns
    /// whether the strategy is still running afterwards.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.finished() => {}
        }
        self.is_running()
    }
}
