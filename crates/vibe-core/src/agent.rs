//! Agent facade: connection lifecycle, state queries, and commands.
//!
//! The [`Agent`] owns one [`Dispatcher`], the live [`Connection`] (when
//! connected), and the task that pumps environment events into the
//! dispatcher. Behaviors and strategies receive an `Arc<Agent>` and never
//! touch the connection directly.
//!
//! # Lifecycle
//!
//! 1. [`Agent::connect`] opens a session, enables handlers, resets the tick
//!    counter and starts the event pump. Tick delivery stays suspended.
//! 2. Each spawn event bumps the spawn count; once it reaches the configured
//!    activation count, tick delivery starts.
//! 3. [`Agent::disconnect`] disables all delivery and closes the session.
//!    [`Agent::shutdown`] additionally records a [`ShutdownReason`] and wakes
//!    [`Agent::wait_for_shutdown`]; the process decides what to do with it.
//! 4. [`Agent::reconnect`] and [`Agent::schedule_reconnect`] disconnect, wait
//!    and connect again, within a sliding-window reconnect budget.
//!
//! State accessors always read fresh values from the connection; callers
//! must not hold them across a suspension point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vibe_types::{
    Coordinate, Dimension, EntityId, EntityKind, EntitySummary, EnvironmentEvent, Event,
    EventKind, Hand, Inventory, ItemStack, RawEntity, SessionId, TradeOffer,
};

use crate::config::BotConfig;
use crate::connection::{ConnectOptions, Connection, ConnectionError, Connector};
use crate::dispatcher::{DispatchReport, Dispatcher, EventHandler, HandlerResult, Outcome};
use crate::registry::{FoodInfo, GameData};

/// Maximum food level.
pub const MAX_HUNGER: u32 = 20;

/// Maximum health.
pub const MAX_HEALTH: f32 = 20.0;

/// Range handed to the movement engine with every goal.
pub const GOAL_RANGE: f64 = 1.0;

/// Interval at which [`Agent::eat`] re-reads the food level.
const EAT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interval at which [`Agent::wait_for_active_ticks`] re-checks activation.
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors returned by facade commands.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No session is open.
    #[error("agent is not connected")]
    NotConnected,

    /// The connection collaborator failed.
    #[error("connection error: {source}")]
    Connection {
        /// The underlying connection error.
        #[from]
        source: ConnectionError,
    },

    /// An inventory slot named by the caller is empty.
    #[error("inventory slot {slot} is empty")]
    EmptySlot {
        /// The slot index.
        slot: u16,
    },

    /// Too many reconnects inside the budget window.
    #[error("reconnect budget exhausted: {count} reconnects within {window_secs}s")]
    ReconnectBudgetExhausted {
        /// Reconnects already made inside the window.
        count: usize,
        /// Window length in seconds.
        window_secs: u64,
    },

    /// A background task was needed but no tokio runtime is running.
    #[error("no async runtime available")]
    NoRuntime,
}

/// Why the agent asked the hosting process to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ShutdownReason {
    /// Navigation reached its target with exit-on-arrival set.
    Arrived,
    /// A safety check failed.
    Safety(String),
    /// Spawn activation never completed.
    ActivationTimeout,
    /// Reconnects kept failing inside the budget window.
    ReconnectBudgetExhausted,
    /// A procedural strategy ran to completion.
    StrategyFinished,
    /// The host process asked for a stop.
    Requested,
}

impl core::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Arrived => f.write_str("arrived at destination"),
            Self::Safety(reason) => write!(f, "safety: {reason}"),
            Self::ActivationTimeout => f.write_str("timed out waiting for spawn activation"),
            Self::ReconnectBudgetExhausted => f.write_str("reconnect budget exhausted"),
            Self::StrategyFinished => f.write_str("strategy finished"),
            Self::Requested => f.write_str("stop requested"),
        }
    }
}

/// Serializable snapshot of agent state for observability.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    /// Account name.
    pub username: String,
    /// Current session, if connected.
    pub session: Option<SessionId>,
    /// Whether a session is open.
    pub connected: bool,
    /// Whether tick delivery is active.
    pub ticks_active: bool,
    /// Spawn events seen this session.
    pub spawn_count: u32,
    /// Current position.
    pub position: Option<Coordinate>,
    /// Current health.
    pub health: Option<f32>,
    /// Current food level.
    pub food: Option<u32>,
    /// Current dimension.
    pub dimension: Option<Dimension>,
    /// Inventory snapshot.
    pub inventory: Option<Inventory>,
    /// Last movement goal.
    pub goal: Option<Coordinate>,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sliding-window limit on reconnects.
#[derive(Debug)]
struct ReconnectBudget {
    max: u32,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl ReconnectBudget {
    /// Record a reconnect at `now` if the window has room. A `max` of zero
    /// means unlimited.
    fn admit(&self, now: Instant) -> Result<(), AgentError> {
        let mut recent = lock(&self.recent);
        while recent
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > self.window)
        {
            recent.pop_front();
        }
        let max = usize::try_from(self.max).unwrap_or(usize::MAX);
        if self.max > 0 && recent.len() >= max {
            return Err(AgentError::ReconnectBudgetExhausted {
                count: recent.len(),
                window_secs: self.window.as_secs(),
            });
        }
        recent.push_back(now);
        Ok(())
    }
}

/// Releases the activation lock when dropped.
struct ActivationGuard<'a>(&'a AtomicBool);

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The agent facade. Always handled through `Arc<Agent>`.
pub struct Agent {
    this: Weak<Self>,
    options: ConnectOptions,
    required_spawns: u32,
    pause_pathing_to_eat: bool,
    goal_set_attempts: u32,
    goal_retry_interval: Duration,
    goal_reconnect_wait: Duration,
    active_wait: Duration,
    connector: Arc<dyn Connector>,
    game_data: Arc<dyn GameData>,
    dispatcher: Arc<Dispatcher>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    session: Mutex<Option<SessionId>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    spawn_count: AtomicU32,
    goal: Mutex<Option<Coordinate>>,
    activation_lock: AtomicBool,
    reconnect_budget: ReconnectBudget,
    reconnects: AtomicU64,
    shutdown_reason: Mutex<Option<ShutdownReason>>,
    shutdown_notify: Notify,
}

impl core::fmt::Debug for Agent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Agent")
            .field("username", &self.options.username)
            .field("connected", &self.is_connected())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Build a disconnected agent. The built-in login, spawn, kick, death
    /// and chat handlers are registered first, so they run before any
    /// behavior registered later.
    pub fn new(
        config: &BotConfig,
        connector: Arc<dyn Connector>,
        game_data: Arc<dyn GameData>,
    ) -> Arc<Self> {
        let conn = &config.connection;
        Arc::new_cyclic(|this: &Weak<Self>| {
            let dispatcher = Arc::new(Dispatcher::new());
            let defaults: Arc<dyn EventHandler> = Arc::new(DefaultHandlers {
                agent: this.clone(),
                username: conn.username.clone(),
            });
            for kind in [
                EventKind::Login,
                EventKind::Spawn,
                EventKind::Kicked,
                EventKind::Death,
                EventKind::Chat,
            ] {
                dispatcher.register(kind, Arc::clone(&defaults));
            }

            Self {
                this: this.clone(),
                options: ConnectOptions {
                    host: conn.host.clone(),
                    port: conn.port,
                    username: conn.username.clone(),
                    version: conn.mc_version.clone(),
                    no_auth: conn.no_auth,
                },
                required_spawns: conn.required_spawns(),
                pause_pathing_to_eat: conn.pauses_pathing_to_eat(),
                goal_set_attempts: conn.goal_set_attempts.max(1),
                goal_retry_interval: conn.goal_retry_interval(),
                goal_reconnect_wait: config.safety.stuck_reconnect_wait(),
                active_wait: conn.active_wait(),
                connector,
                game_data,
                dispatcher,
                connection: RwLock::new(None),
                session: Mutex::new(None),
                pump: Mutex::new(None),
                spawn_count: AtomicU32::new(0),
                goal: Mutex::new(None),
                activation_lock: AtomicBool::new(false),
                reconnect_budget: ReconnectBudget {
                    max: config.safety.max_consecutive_reconnects,
                    window: config.safety.reconnect_window(),
                    recent: Mutex::new(VecDeque::new()),
                },
                reconnects: AtomicU64::new(0),
                shutdown_reason: Mutex::new(None),
                shutdown_notify: Notify::new(),
            }
        })
    }

    /// The agent's event dispatcher.
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The static game data collaborator.
    pub fn game_data(&self) -> &dyn GameData {
        self.game_data.as_ref()
    }

    /// Account name.
    pub fn username(&self) -> &str {
        &self.options.username
    }

    /// Server host.
    pub fn host(&self) -> &str {
        &self.options.host
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_connection(&self) -> Result<Arc<dyn Connection>, AgentError> {
        self.connection().ok_or(AgentError::NotConnected)
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// Current session id.
    pub fn session(&self) -> Option<SessionId> {
        *lock(&self.session)
    }

    /// Open a session and start pumping its events into the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Connection`] if the connector fails.
    pub async fn connect(&self) -> Result<SessionId, AgentError> {
        info!(host = %self.options.host, port = self.options.port, "Connecting to server");
        let session = self.connector.connect(&self.options).await?;

        self.stop_pump();
        self.spawn_count.store(0, Ordering::Release);
        self.dispatcher.reset_ticks();
        self.dispatcher.set_ticks_active(false);
        self.dispatcher.set_handlers_enabled(true);

        let id = SessionId::new();
        let previous = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session.connection);
        if let Some(previous) = previous {
            previous.end("replaced by new session");
        }
        *lock(&self.session) = Some(id);
        *lock(&self.pump) = Some(self.spawn_pump(session.events));

        info!(
            host = %self.options.host,
            port = self.options.port,
            username = %self.options.username,
            session = %id,
            "Connected to server"
        );
        Ok(id)
    }

    fn spawn_pump(&self, mut events: mpsc::UnboundedReceiver<EnvironmentEvent>) -> JoinHandle<()> {
        let agent = self.this.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(agent) = agent.upgrade() else {
                    break;
                };
                agent.handle_environment_event(event);
            }
            debug!("Environment event stream closed");
        })
    }

    fn stop_pump(&self) {
        if let Some(handle) = lock(&self.pump).take() {
            handle.abort();
        }
    }

    /// Disable all delivery and close the session. Safe to call when already
    /// disconnected.
    pub fn disconnect(&self) {
        self.dispatcher.set_handlers_enabled(false);
        self.dispatcher.set_ticks_active(false);
        self.spawn_count.store(0, Ordering::Release);

        let connection = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let session = lock(&self.session).take();
        if let Some(connection) = connection {
            info!(session = ?session, "Disconnecting from server");
            connection.end("disconnect");
        }
        self.stop_pump();
    }

    /// Disconnect and ask the hosting process to stop. The first reason
    /// recorded wins.
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.disconnect();
        let mut slot = lock(&self.shutdown_reason);
        if slot.is_none() {
            warn!(%reason, "Agent shutting down");
            *slot = Some(reason);
        }
        drop(slot);
        self.shutdown_notify.notify_waiters();
    }

    /// The recorded shutdown reason, if a shutdown was requested.
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        lock(&self.shutdown_reason).clone()
    }

    /// Whether a shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        lock(&self.shutdown_reason).is_some()
    }

    /// Wait until [`shutdown`](Self::shutdown) is called, returning its
    /// reason.
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        loop {
            let notified = self.shutdown_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(reason) = self.shutdown_reason() {
                return reason;
            }
            notified.await;
        }
    }

    /// Count a reconnect against the budget and disconnect. On budget
    /// exhaustion the agent shuts down instead.
    fn begin_reconnect(&self) -> Result<(), AgentError> {
        if let Err(err) = self.reconnect_budget.admit(Instant::now()) {
            error!(%err, "Refusing to reconnect");
            self.shutdown(ShutdownReason::ReconnectBudgetExhausted);
            return Err(err);
        }
        self.reconnects.fetch_add(1, Ordering::AcqRel);
        self.disconnect();
        Ok(())
    }

    /// Disconnect, wait, and connect again.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ReconnectBudgetExhausted`] if the budget is
    /// spent (the agent is then shut down), or the connect error.
    pub async fn reconnect(&self, wait: Duration) -> Result<(), AgentError> {
        self.begin_reconnect()?;
        info!(wait_secs = wait.as_secs(), "Reconnecting to server");
        tokio::time::sleep(wait).await;
        if self.is_shutdown_requested() {
            return Ok(());
        }
        self.connect().await.map(|_| ())
    }

    /// Disconnect now and reconnect after `wait` in a background task. With
    /// `resume_goal`, the last movement goal is re-issued once ticks are
    /// active again.
    ///
    /// Returns whether a reconnect was started. The disconnect happens
    /// before this returns, so no further ticks are delivered from the old
    /// session.
    pub fn schedule_reconnect(&self, wait: Duration, resume_goal: bool) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("No runtime available to reconnect on");
            return false;
        };
        let Some(agent) = self.this.upgrade() else {
            return false;
        };
        if self.begin_reconnect().is_err() {
            return false;
        }
        info!(wait_secs = wait.as_secs(), resume_goal, "Reconnect scheduled");

        runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            if agent.is_shutdown_requested() {
                return;
            }
            if let Err(err) = agent.connect().await {
                error!(%err, "Reconnect failed");
                return;
            }
            if resume_goal
                && agent.wait_for_active_ticks(agent.active_wait).await
                && let Some(goal) = agent.goal()
            {
                info!(%goal, "Resuming movement goal after reconnect");
                if let Err(err) = agent.goto(goal) {
                    warn!(%err, "Could not resume movement goal");
                }
            }
        });
        true
    }

    /// Reconnects started since construction.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Wait until tick delivery is active, polling once per second. On
    /// timeout the agent shuts down and `false` is returned.
    pub async fn wait_for_active_ticks(&self, max_wait: Duration) -> bool {
        let started = Instant::now();
        while !self.dispatcher.ticks_active() {
            if self.is_shutdown_requested() {
                return false;
            }
            if started.elapsed() > max_wait {
                error!(
                    max_wait_secs = max_wait.as_secs(),
                    "Timed out waiting for the agent to become active"
                );
                self.shutdown(ShutdownReason::ActivationTimeout);
                return false;
            }
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
        true
    }

    /// Spawn events seen this session.
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::Acquire)
    }

    fn record_spawn(&self) {
        let count = self.spawn_count.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        info!(username = %self.options.username, count, "Agent spawned in the world");
        if count >= self.required_spawns && !self.dispatcher.ticks_active() {
            self.dispatcher.set_ticks_active(true);
            info!(count, "Spawn activation complete, tick delivery started");
        }
    }

    /// Route one environment event through the dispatcher. Physics ticks
    /// advance the tick counter and are stamped with their slot.
    pub fn handle_environment_event(&self, event: EnvironmentEvent) -> DispatchReport {
        let event = match event {
            EnvironmentEvent::PhysicsTick(physics) => {
                return self.dispatcher.dispatch_tick(physics);
            }
            EnvironmentEvent::Login => Event::Login,
            EnvironmentEvent::Spawn => Event::Spawn,
            EnvironmentEvent::Kicked { reason } => Event::Kicked { reason },
            EnvironmentEvent::Death => Event::Death,
            EnvironmentEvent::Chat { message } => Event::Chat { message },
            EnvironmentEvent::Health { health, food } => Event::Health { health, food },
            EnvironmentEvent::End { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "Connection ended");
                Event::End { reason }
            }
        };
        self.dispatcher.dispatch(&event)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Current position.
    pub fn position(&self) -> Option<Coordinate> {
        self.connection()?.position()
    }

    /// Current health.
    pub fn health(&self) -> Option<f32> {
        self.connection()?.health()
    }

    /// Current food level.
    pub fn food(&self) -> Option<u32> {
        self.connection()?.food()
    }

    /// Current dimension.
    pub fn dimension(&self) -> Option<Dimension> {
        self.connection()?.dimension()
    }

    /// Fresh inventory snapshot.
    pub fn inventory(&self) -> Option<Inventory> {
        self.connection()?.inventory()
    }

    /// Last movement goal issued through [`goto`](Self::goto).
    pub fn goal(&self) -> Option<Coordinate> {
        *lock(&self.goal)
    }

    /// Forget the movement goal so nothing resumes it.
    pub fn clear_goal(&self) {
        lock(&self.goal).take();
    }

    /// All loaded entities as reported by the environment.
    pub fn raw_entities(&self) -> Vec<RawEntity> {
        self.connection().map(|c| c.entities()).unwrap_or_default()
    }

    /// Nearby entities, excluding the agent itself, with display names
    /// resolved: usernames for players, item names for dropped items.
    pub fn entities(&self) -> Vec<EntitySummary> {
        self.raw_entities()
            .into_iter()
            .filter(|e| {
                !(e.kind == EntityKind::Player
                    && e.username.as_deref() == Some(self.options.username.as_str()))
            })
            .map(|e| {
                let display_name = match e.kind {
                    EntityKind::Player => e.username.clone(),
                    EntityKind::Item => e.item_id.and_then(|id| self.game_data.item_name(id)),
                    EntityKind::Villager | EntityKind::Other(_) => None,
                };
                EntitySummary {
                    position: e.position,
                    kind: e.kind,
                    display_name,
                }
            })
            .collect()
    }

    /// The loaded entity closest to `position`, if one lies within
    /// `tolerance`.
    pub fn entity_near(&self, position: &Coordinate, tolerance: f64) -> Option<RawEntity> {
        self.raw_entities()
            .into_iter()
            .map(|e| (e.position.distance(position), e))
            .filter(|(d, _)| *d < tolerance)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, e)| e)
    }

    /// The stack equipped to `hand`.
    pub fn item_in_hand(&self, hand: Hand) -> Option<ItemStack> {
        self.connection()?.held_item(hand)
    }

    /// Food properties of `item`, if it is edible.
    pub fn food_info(&self, item: &ItemStack) -> Option<FoodInfo> {
        self.game_data.food(item.type_id)
    }

    /// Serializable snapshot of the current state.
    pub fn status(&self) -> AgentStatus {
        let connection = self.connection();
        AgentStatus {
            username: self.options.username.clone(),
            session: self.session(),
            connected: connection.is_some(),
            ticks_active: self.dispatcher.ticks_active(),
            spawn_count: self.spawn_count(),
            position: connection.as_ref().and_then(|c| c.position()),
            health: connection.as_ref().and_then(|c| c.health()),
            food: connection.as_ref().and_then(|c| c.food()),
            dimension: connection.as_ref().and_then(|c| c.dimension()),
            inventory: connection.as_ref().and_then(|c| c.inventory()),
            goal: self.goal(),
            observed_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Remember `target` as the movement goal and hand it to the movement
    /// engine.
    ///
    /// Returns `Ok(true)` when the goal was accepted immediately. When the
    /// first attempt fails, further attempts continue in the background at
    /// the configured interval and `Ok(false)` is returned; if every attempt
    /// fails the agent reconnects and re-issues the goal, counted against
    /// the reconnect budget.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] without a session, or
    /// [`AgentError::NoRuntime`] when retries are needed outside a runtime.
    pub fn goto(&self, target: Coordinate) -> Result<bool, AgentError> {
        let connection = self.require_connection()?;
        *lock(&self.goal) = Some(target);

        let err = match connection.set_goal(target, GOAL_RANGE) {
            Ok(()) => {
                debug!(%target, "Movement goal set");
                return Ok(true);
            }
            Err(err) => err,
        };
        warn!(%target, attempt = 1, %err, "Failed to set goal");
        if self.goal_set_attempts <= 1 {
            self.goal_unreachable(target);
            return Ok(false);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_err| AgentError::NoRuntime)?;
        let agent = self.this.clone();
        let attempts = self.goal_set_attempts;
        let interval = self.goal_retry_interval;
        runtime.spawn(async move {
            for attempt in 2..=attempts {
                tokio::time::sleep(interval).await;
                let Some(agent) = agent.upgrade() else {
                    return;
                };
                if agent.goal() != Some(target) {
                    debug!(%target, "Goal replaced, abandoning retries");
                    return;
                }
                let Some(connection) = agent.connection() else {
                    debug!(%target, "Disconnected, abandoning goal retries");
                    return;
                };
                match connection.set_goal(target, GOAL_RANGE) {
                    Ok(()) => {
                        info!(%target, attempt, "Movement goal set after retry");
                        return;
                    }
                    Err(err) => warn!(%target, attempt, %err, "Failed to set goal"),
                }
            }
            if let Some(agent) = agent.upgrade() {
                agent.goal_unreachable(target);
            }
        });
        Ok(false)
    }

    fn goal_unreachable(&self, target: Coordinate) {
        error!(
            %target,
            attempts = self.goal_set_attempts,
            "Failed to set goal after all attempts, reconnecting"
        );
        self.schedule_reconnect(self.goal_reconnect_wait, true);
    }

    /// Halt the movement engine. The remembered goal is kept.
    pub fn stop_pathing(&self) {
        if let Some(connection) = self.connection() {
            connection.stop_pathing();
        }
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Equip the stack in `slot` to `hand`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptySlot`] if the slot holds nothing, or the
    /// connection error.
    pub fn equip_inventory_item(&self, slot: u16, hand: Hand) -> Result<(), AgentError> {
        let connection = self.require_connection()?;
        let occupied = connection
            .inventory()
            .is_some_and(|inv| inv.get(slot).is_some());
        if !occupied {
            warn!(slot, "Slot not found in inventory");
            return Err(AgentError::EmptySlot { slot });
        }
        connection.equip(slot, hand)?;
        Ok(())
    }

    /// Make sure a shield is in the off hand. Returns whether one is there.
    ///
    /// # Errors
    ///
    /// Returns the connection error if equipping fails.
    pub fn equip_shield(&self) -> Result<bool, AgentError> {
        let connection = self.require_connection()?;
        if connection
            .held_item(Hand::Off)
            .is_some_and(|item| item.name == "shield")
        {
            return Ok(true);
        }
        let Some(shield) = connection
            .inventory()
            .and_then(|inv| inv.find("shield").cloned())
        else {
            return Ok(false);
        };
        connection.equip(shield.slot, Hand::Off)?;
        info!(slot = shield.slot, "Equipped shield");
        Ok(true)
    }

    /// Begin using the item in `hand`.
    ///
    /// # Errors
    ///
    /// Returns the connection error.
    pub fn activate_item(&self, hand: Hand) -> Result<(), AgentError> {
        self.require_connection()?.activate_item(hand)?;
        Ok(())
    }

    /// Whether the held item is in use.
    pub fn is_using_held_item(&self) -> bool {
        self.connection().is_some_and(|c| c.is_using_held_item())
    }

    /// Whether the activation lock is currently held by a meal.
    pub fn is_eating(&self) -> bool {
        self.activation_lock.load(Ordering::Acquire)
    }

    /// Eat the item in the main hand, waiting up to `max_wait` for the food
    /// level to rise.
    ///
    /// Only one meal runs at a time: if another caller holds the activation
    /// lock this returns `Ok(false)` immediately. When pathing pauses for
    /// meals and a goal is set, movement halts for the meal and the goal is
    /// re-issued afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] or the activation error.
    pub async fn eat(&self, max_wait: Duration) -> Result<bool, AgentError> {
        let connection = self.require_connection()?;
        if self
            .activation_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Activation lock held, declining to eat");
            return Ok(false);
        }
        let _guard = ActivationGuard(&self.activation_lock);

        let paused_goal = if self.pause_pathing_to_eat {
            self.goal()
        } else {
            None
        };
        if paused_goal.is_some() {
            info!("Pausing pathfinding to eat");
            connection.stop_pathing();
        }
        drop(connection);

        let eaten = self.consume(max_wait).await;

        if let Some(goal) = paused_goal {
            match self.goto(goal) {
                Ok(_) => info!(%goal, "Goto goal resumed"),
                Err(err) => warn!(%goal, %err, "Could not resume goal after eating"),
            }
        }
        eaten
    }

    async fn consume(&self, max_wait: Duration) -> Result<bool, AgentError> {
        let connection = self.require_connection()?;
        connection.deactivate_item();
        connection.activate_item(Hand::Main)?;
        drop(connection);

        let before = self.food().unwrap_or(0);
        let started = Instant::now();
        loop {
            if self.food().is_some_and(|food| food > before) {
                return Ok(true);
            }
            if started.elapsed() > max_wait {
                info!(
                    max_wait_ms = u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
                    "Timed out waiting for food to be eaten"
                );
                return Ok(false);
            }
            tokio::time::sleep(EAT_POLL_INTERVAL).await;
        }
    }

    // -----------------------------------------------------------------------
    // Trading
    // -----------------------------------------------------------------------

    /// Open the trade window of villager `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] or the connection error.
    pub async fn open_villager(&self, id: EntityId) -> Result<Vec<TradeOffer>, AgentError> {
        let connection = self.require_connection()?;
        Ok(connection.open_villager(id).await?)
    }

    /// Execute offer `index` of the open window `times` times.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] or the connection error.
    pub async fn trade(&self, index: usize, times: u32) -> Result<(), AgentError> {
        let connection = self.require_connection()?;
        Ok(connection.trade(index, times).await?)
    }

    /// Offers of the open trade window.
    pub fn trade_offers(&self) -> Option<Vec<TradeOffer>> {
        self.connection()?.trade_offers()
    }

    /// Close the open window.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] or the connection error.
    pub fn close_window(&self) -> Result<(), AgentError> {
        self.require_connection()?.close_window()?;
        Ok(())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// Built-in handlers for connection-level events.
struct DefaultHandlers {
    agent: Weak<Agent>,
    username: String,
}

impl EventHandler for DefaultHandlers {
    fn name(&self) -> &str {
        "Default Handlers"
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        let Some(agent) = self.agent.upgrade() else {
            return Ok(Outcome::Idle);
        };
        match event {
            Event::Login => {
                info!(
                    username = %self.username,
                    host = %agent.options.host,
                    port = agent.options.port,
                    "Logged in to the server"
                );
            }
            Event::Spawn => agent.record_spawn(),
            Event::Kicked { reason } => {
                warn!(username = %self.username, reason = %reason, "Kicked from the server");
            }
            Event::Death => {
                let position = agent.position();
                warn!(username = %self.username, position = ?position, "Agent died");
            }
            Event::Chat { message } if message.contains(self.username.as_str()) => {
                info!(message = %message, "Important message");
            }
            Event::Chat { .. } | Event::Health { .. } | Event::Tick(_) | Event::End { .. } => {
                return Ok(Outcome::Idle);
            }
        }
        Ok(Outcome::Acted)
    }
}
