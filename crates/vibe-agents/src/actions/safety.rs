//! Continuous safety checks run on every tick.
//!
//! Checks run in a fixed order and the first one that trips decides the
//! tick's [`SafetyVerdict`]:
//!
//! 1. Health at or below the critical threshold: disconnect for good.
//! 2. A player outside the whitelist nearby: reconnect after the configured
//!    wait, or disconnect when no wait is configured.
//! 3. Inventory holds items but nothing edible outside the denylist:
//!    disconnect. An unreadable inventory is skipped with a warning.
//! 4. Less than one block of horizontal movement since the checkpoint for
//!    longer than the stuck threshold: reconnect after a short wait and
//!    resume the movement goal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vibe_core::action::Behavior;
use vibe_core::agent::{Agent, ShutdownReason};
use vibe_core::config::{EatingConfig, SafetyConfig};
use vibe_core::dispatcher::{HandlerResult, Outcome};
use vibe_types::{Coordinate, EntityKind, Event};

/// Minimum horizontal movement that counts as progress, in blocks.
const STUCK_MOVE_THRESHOLD: f64 = 1.0;

/// Outcome of one round of checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Nothing tripped.
    Clear,
    /// Disconnect and stop.
    Disconnect(String),
    /// Disconnect, wait, connect again.
    Reconnect {
        /// Why.
        reason: String,
        /// How long to stay offline.
        wait: Duration,
        /// Re-issue the movement goal once back online.
        resume_goal: bool,
    },
}

/// Per-tick health, player, food and stuck checks.
#[derive(Debug)]
pub struct SafetyMonitor {
    agent: Arc<Agent>,
    health_threshold: f32,
    check_players: bool,
    check_food: bool,
    check_stuck: bool,
    reconnect_wait: Option<Duration>,
    whitelist: Vec<String>,
    food_denylist: Vec<String>,
    stuck_threshold: Duration,
    stuck_reconnect_wait: Duration,
    checkpoint: Option<(Coordinate, Instant)>,
}

impl SafetyMonitor {
    /// A monitor using `safety` thresholds and the `eating` food denylist.
    pub fn new(agent: Arc<Agent>, safety: &SafetyConfig, eating: &EatingConfig) -> Self {
        Self {
            agent,
            health_threshold: safety.health_threshold,
            check_players: safety.check_players,
            check_food: safety.check_food,
            check_stuck: safety.check_stuck,
            reconnect_wait: safety.reconnect_wait_secs.map(Duration::from_secs),
            whitelist: safety.player_whitelist.clone(),
            food_denylist: eating.food_denylist.clone(),
            stuck_threshold: safety.stuck_threshold(),
            stuck_reconnect_wait: safety.stuck_reconnect_wait(),
            checkpoint: None,
        }
    }

    /// Reconnect after `wait` instead of disconnecting when a player shows
    /// up.
    #[must_use]
    pub const fn with_reconnect_wait(mut self, wait: Option<Duration>) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// The stuck-detection checkpoint, if one is held.
    pub const fn checkpoint(&self) -> Option<(Coordinate, Instant)> {
        self.checkpoint
    }

    /// Run every enabled check against the agent's current state.
    pub fn evaluate(&mut self, now: Instant) -> SafetyVerdict {
        if let Some(verdict) = self.check_health() {
            return verdict;
        }
        if self.check_players
            && let Some(verdict) = self.check_player_presence()
        {
            return verdict;
        }
        if self.check_food
            && let Some(verdict) = self.check_food_supply()
        {
            return verdict;
        }
        if self.check_stuck
            && let Some(verdict) = self.check_progress(now)
        {
            return verdict;
        }
        SafetyVerdict::Clear
    }

    fn check_health(&self) -> Option<SafetyVerdict> {
        let health = self.agent.health()?;
        (health <= self.health_threshold).then(|| {
            error!(health, threshold = self.health_threshold, "Health critical");
            SafetyVerdict::Disconnect(format!("health {health} at or below {}", self.health_threshold))
        })
    }

    fn check_player_presence(&self) -> Option<SafetyVerdict> {
        let intruder = self.agent.entities().into_iter().find_map(|e| {
            let name = e.display_name.filter(|_| e.kind == EntityKind::Player)?;
            (!self.whitelist.contains(&name)).then_some((name, e.position))
        })?;
        let (name, position) = intruder;
        warn!(player = %name, position = %position, "Player detected");
        let reason = format!("player {name} nearby");
        Some(match self.reconnect_wait {
            Some(wait) => SafetyVerdict::Reconnect {
                reason,
                wait,
                resume_goal: true,
            },
            None => SafetyVerdict::Disconnect(reason),
        })
    }

    fn check_food_supply(&self) -> Option<SafetyVerdict> {
        let inventory = self.agent.inventory().filter(|inv| !inv.is_empty());
        let Some(inventory) = inventory else {
            warn!("Inventory unreadable, skipping food check");
            return None;
        };
        let has_food = inventory.stacks().any(|stack| {
            self.agent.food_info(stack).is_some() && !self.food_denylist.contains(&stack.name)
        });
        if has_food {
            return None;
        }
        error!(slots = inventory.len(), "No valid food left in inventory");
        Some(SafetyVerdict::Disconnect(String::from("out of food")))
    }

    fn check_progress(&mut self, now: Instant) -> Option<SafetyVerdict> {
        let position = self.agent.position()?;
        let Some((anchor, since)) = self.checkpoint else {
            self.checkpoint = Some((position, now));
            return None;
        };
        if position.moved_horizontally(&anchor, STUCK_MOVE_THRESHOLD) {
            self.checkpoint = Some((position, now));
            return None;
        }
        let stalled = now.saturating_duration_since(since);
        if stalled < self.stuck_threshold {
            return None;
        }
        warn!(
            position = %position,
            stalled_secs = stalled.as_secs(),
            "Agent appears stuck"
        );
        self.checkpoint = None;
        Some(SafetyVerdict::Reconnect {
            reason: String::from("stuck"),
            wait: self.stuck_reconnect_wait,
            resume_goal: true,
        })
    }

    fn apply(&self, verdict: SafetyVerdict) {
        match verdict {
            SafetyVerdict::Clear => {}
            SafetyVerdict::Disconnect(reason) => {
                self.agent.shutdown(ShutdownReason::Safety(reason));
            }
            SafetyVerdict::Reconnect {
                reason,
                wait,
                resume_goal,
            } => {
                info!(%reason, wait_secs = wait.as_secs(), "Safety reconnect");
                self.agent.schedule_reconnect(wait, resume_goal);
            }
        }
    }
}

impl Behavior for SafetyMonitor {
    fn name(&self) -> &'static str {
        "Safety Monitor"
    }

    fn description(&self) -> &'static str {
        "Disconnects or reconnects when health, players, food or progress look unsafe."
    }

    fn run_once(&mut self, _event: &Event) -> HandlerResult {
        if !self.agent.is_connected() {
            debug!("Not connected, skipping safety checks");
            return Ok(Outcome::Idle);
        }
        match self.evaluate(Instant::now()) {
            SafetyVerdict::Clear => Ok(Outcome::Idle),
            verdict => {
                self.apply(verdict);
                Ok(Outcome::Acted)
            }
        }
    }

    fn on_stop(&mut self) {
        self.checkpoint = None;
    }
}
