//! In-process environment for dry runs and tests.
//!
//! [`LoopbackWorld`] holds a tiny world model: one agent with a position,
//! health, food and inventory, a list of nearby entities, and villagers with
//! trade offers. [`LoopbackConnector`] opens sessions onto it. Movement is a
//! straight line toward the goal at walking speed, one step per
//! [`LoopbackWorld::tick`]; eating completes after a fixed delay of game
//! time. Every command the agent issues is appended to a log that tests can
//! inspect with [`LoopbackWorld::commands`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use vibe_types::{
    Coordinate, Dimension, EntityId, EntityKind, EnvironmentEvent, Hand, Inventory, ItemStack,
    PhysicsTick, RawEntity, TradeOffer,
};

use crate::connection::{ConnectOptions, Connection, ConnectionError, Connector, Session};
use crate::registry::{GameData, StaticGameData};

/// Blocks moved per tick while a goal is set.
pub const WALK_SPEED_PER_TICK: f64 = 0.215;

/// Game time a meal takes to finish.
pub const EAT_DURATION: Duration = Duration::from_millis(1600);

/// Inventory slot of the selected hotbar item.
pub const MAIN_HAND_SLOT: u16 = 36;

/// Inventory slot of the off hand.
pub const OFF_HAND_SLOT: u16 = 45;

/// First general-purpose inventory slot.
const FIRST_STORAGE_SLOT: u16 = 9;

/// One command issued through a loopback connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A movement goal was set.
    SetGoal {
        /// Goal position.
        target: Coordinate,
        /// Acceptable distance.
        range: f64,
    },
    /// Movement was halted.
    StopPathing,
    /// A stack was moved to a hand.
    Equip {
        /// Source slot.
        slot: u16,
        /// Target hand.
        hand: Hand,
    },
    /// The held item was activated.
    ActivateItem(Hand),
    /// Item use stopped.
    DeactivateItem,
    /// A villager trade window was opened.
    OpenVillager(EntityId),
    /// A trade was executed.
    Trade {
        /// Offer index.
        index: usize,
        /// Repetitions.
        times: u32,
    },
    /// The open window was closed.
    CloseWindow,
    /// The connection was closed.
    End,
}

#[derive(Debug)]
struct WorldState {
    username: String,
    position: Option<Coordinate>,
    health: Option<f32>,
    food: Option<u32>,
    dimension: Option<Dimension>,
    inventory: BTreeMap<u16, ItemStack>,
    inventory_readable: bool,
    entities: Vec<RawEntity>,
    offers: BTreeMap<EntityId, Vec<TradeOffer>>,
    goal: Option<(Coordinate, f64)>,
    stuck: bool,
    goal_failures: u32,
    connect_failures: u32,
    trade_failures: bool,
    using: Option<Hand>,
    eating_until: Option<Instant>,
    window: Option<EntityId>,
    commands: Vec<Command>,
    connects: u32,
    generation: u64,
    spawns_on_join: u32,
    sequence: u64,
    events: Option<mpsc::UnboundedSender<EnvironmentEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-process world.
#[derive(Debug)]
pub struct LoopbackWorld {
    data: StaticGameData,
    state: Mutex<WorldState>,
}

impl LoopbackWorld {
    /// A world with the agent standing at `position`, full health and food,
    /// in the overworld, with an empty inventory.
    pub fn new(position: Coordinate) -> Arc<Self> {
        Arc::new(Self {
            data: StaticGameData::vanilla(),
            state: Mutex::new(WorldState {
                username: String::new(),
                position: Some(position),
                health: Some(20.0),
                food: Some(20),
                dimension: Some(Dimension::Overworld),
                inventory: BTreeMap::new(),
                inventory_readable: true,
                entities: Vec::new(),
                offers: BTreeMap::new(),
                goal: None,
                stuck: false,
                goal_failures: 0,
                connect_failures: 0,
                trade_failures: false,
                using: None,
                eating_until: None,
                window: None,
                commands: Vec::new(),
                connects: 0,
                generation: 0,
                spawns_on_join: 1,
                sequence: 0,
                events: None,
            }),
        })
    }

    /// The item table backing this world.
    pub const fn game_data(&self) -> &StaticGameData {
        &self.data
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        lock(&self.state)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Commands issued so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    /// Forget the command log.
    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Sessions opened so far.
    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    /// Whether a session is currently open.
    pub fn is_open(&self) -> bool {
        self.state().events.is_some()
    }

    /// The goal the movement engine is working on.
    pub fn current_goal(&self) -> Option<Coordinate> {
        self.state().goal.map(|(target, _)| target)
    }

    /// Total count of `name` in the inventory.
    pub fn count_of(&self, name: &str) -> u32 {
        let mut state = self.state();
        self.settle_meal(&mut state);
        state
            .inventory
            .values()
            .filter(|s| s.name == name)
            .fold(0_u32, |acc, s| acc.saturating_add(s.count))
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Move the agent.
    pub fn set_position(&self, position: Option<Coordinate>) {
        self.state().position = position;
    }

    /// Set the health value (`None` means not received yet).
    pub fn set_health(&self, health: Option<f32>) {
        self.state().health = health;
    }

    /// Set the food level (`None` means not received yet).
    pub fn set_food(&self, food: Option<u32>) {
        self.state().food = food;
    }

    /// Set the dimension.
    pub fn set_dimension(&self, dimension: Option<Dimension>) {
        self.state().dimension = dimension;
    }

    /// Make the inventory report as unavailable.
    pub fn set_inventory_readable(&self, readable: bool) {
        self.state().inventory_readable = readable;
    }

    /// Spawn events emitted on every connect.
    pub fn set_spawns_on_join(&self, spawns: u32) {
        self.state().spawns_on_join = spawns;
    }

    /// Freeze movement: goals are accepted but the agent never moves.
    pub fn set_stuck(&self, stuck: bool) {
        self.state().stuck = stuck;
    }

    /// Reject the next `count` goal sets.
    pub fn fail_goal_sets(&self, count: u32) {
        self.state().goal_failures = count;
    }

    /// Reject the next `count` connects.
    pub fn fail_connects(&self, count: u32) {
        self.state().connect_failures = count;
    }

    /// Make every trade fail.
    pub fn fail_trades(&self, fail: bool) {
        self.state().trade_failures = fail;
    }

    /// Add `count` of item `name` to the inventory, stacking onto an
    /// existing stack when there is one. Unknown names are ignored.
    pub fn give(&self, name: &str, count: u32) {
        let Some(type_id) = self.data.item_id(name) else {
            debug!(item = name, "Unknown item, not given");
            return;
        };
        let mut state = self.state();
        add_items(&mut state.inventory, type_id, name, count);
    }

    /// Put `count` of item `name` directly into `hand`, replacing what was
    /// there.
    pub fn hold(&self, hand: Hand, name: &str, count: u32) {
        let Some(type_id) = self.data.item_id(name) else {
            return;
        };
        let slot = hand_slot(hand);
        self.state().inventory.insert(
            slot,
            ItemStack {
                slot,
                type_id,
                name: name.to_owned(),
                count,
            },
        );
    }

    /// Remove every stack of item `name`.
    pub fn take_all(&self, name: &str) {
        self.state().inventory.retain(|_, s| s.name != name);
    }

    /// Add an entity.
    pub fn add_entity(&self, entity: RawEntity) {
        self.state().entities.push(entity);
    }

    /// Add a dropped item entity of item `name` at `position`.
    pub fn drop_item(&self, id: EntityId, name: &str, position: Coordinate) {
        let item_id = self.data.item_id(name);
        self.add_entity(RawEntity {
            id,
            kind: EntityKind::Item,
            position,
            username: None,
            item_id,
            profession: None,
        });
    }

    /// Add another player at `position`.
    pub fn add_player(&self, id: EntityId, username: &str, position: Coordinate) {
        self.add_entity(RawEntity {
            id,
            kind: EntityKind::Player,
            position,
            username: Some(username.to_owned()),
            item_id: None,
            profession: None,
        });
    }

    /// Add a villager with the given profession and trade offers.
    pub fn add_villager(
        &self,
        id: EntityId,
        position: Coordinate,
        profession: &str,
        offers: Vec<TradeOffer>,
    ) {
        self.add_entity(RawEntity {
            id,
            kind: EntityKind::Villager,
            position,
            username: None,
            item_id: None,
            profession: Some(profession.to_owned()),
        });
        self.state().offers.insert(id, offers);
    }

    /// Remove an entity.
    pub fn remove_entity(&self, id: EntityId) {
        let mut state = self.state();
        state.entities.retain(|e| e.id != id);
        state.offers.remove(&id);
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Send `event` to the open session, if any.
    pub fn emit(&self, event: EnvironmentEvent) -> bool {
        let state = self.state();
        state
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Advance the world by one physics tick without emitting it.
    pub fn step_physics(&self) -> PhysicsTick {
        let mut state = self.state();
        self.settle_meal(&mut state);
        state.sequence = state.sequence.saturating_add(1);
        let sequence = state.sequence;

        if state.stuck {
            return PhysicsTick { sequence };
        }
        if let (Some((target, range)), Some(position)) = (state.goal, state.position) {
            let distance = position.distance(&target);
            if distance <= range {
                state.goal = None;
            } else {
                let step = WALK_SPEED_PER_TICK.min(distance) / distance;
                state.position = Some(Coordinate::new(
                    (target.x - position.x).mul_add(step, position.x),
                    (target.y - position.y).mul_add(step, position.y),
                    (target.z - position.z).mul_add(step, position.z),
                ));
            }
        }
        PhysicsTick { sequence }
    }

    /// Advance the world by one physics tick and emit it to the session.
    pub fn tick(&self) -> bool {
        let physics = self.step_physics();
        self.emit(EnvironmentEvent::PhysicsTick(physics))
    }

    /// Tick `count` times.
    pub fn run_ticks(&self, count: u32) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Tick the world every `period` in a background task until aborted.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let world = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                world.tick();
            }
        })
    }

    /// Finish a meal whose duration has elapsed.
    fn settle_meal(&self, state: &mut WorldState) {
        let Some(until) = state.eating_until else {
            return;
        };
        if Instant::now() < until {
            return;
        }
        state.eating_until = None;
        state.using = None;
        let Some(held) = state.inventory.get_mut(&MAIN_HAND_SLOT) else {
            return;
        };
        let Some(food) = self.data.food(held.type_id) else {
            return;
        };
        held.count = held.count.saturating_sub(1);
        if held.count == 0 {
            state.inventory.remove(&MAIN_HAND_SLOT);
        }
        state.food = Some(
            state
                .food
                .unwrap_or(0)
                .saturating_add(food.food_points)
                .min(20),
        );
    }

    fn connect_session(
        self: &Arc<Self>,
        options: &ConnectOptions,
    ) -> Result<Session, ConnectionError> {
        let mut state = self.state();
        if state.connect_failures > 0 {
            state.connect_failures = state.connect_failures.saturating_sub(1);
            return Err(ConnectionError::Connect {
                host: options.host.clone(),
                port: options.port,
                reason: "connection refused".to_owned(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(EnvironmentEvent::Login);
        for _ in 0..state.spawns_on_join {
            let _ = tx.send(EnvironmentEvent::Spawn);
        }
        state.events = Some(tx);
        state.username.clone_from(&options.username);
        state.connects = state.connects.saturating_add(1);
        state.generation = state.generation.saturating_add(1);
        state.window = None;
        state.goal = None;
        let generation = state.generation;
        drop(state);

        Ok(Session {
            connection: Arc::new(LoopbackConnection {
                world: Arc::clone(self),
                generation,
            }),
            events: rx,
        })
    }
}

const fn hand_slot(hand: Hand) -> u16 {
    match hand {
        Hand::Main => MAIN_HAND_SLOT,
        Hand::Off => OFF_HAND_SLOT,
    }
}

fn add_items(inventory: &mut BTreeMap<u16, ItemStack>, type_id: u32, name: &str, count: u32) {
    if let Some(stack) = inventory.values_mut().find(|s| s.name == name) {
        stack.count = stack.count.saturating_add(count);
        return;
    }
    let free = (FIRST_STORAGE_SLOT..OFF_HAND_SLOT)
        .filter(|slot| *slot != MAIN_HAND_SLOT)
        .find(|slot| !inventory.contains_key(slot));
    if let Some(slot) = free {
        inventory.insert(
            slot,
            ItemStack {
                slot,
                type_id,
                name: name.to_owned(),
                count,
            },
        );
    }
}

fn remove_items(inventory: &mut BTreeMap<u16, ItemStack>, name: &str, mut count: u32) {
    let slots: Vec<u16> = inventory
        .values()
        .filter(|s| s.name == name)
        .map(|s| s.slot)
        .collect();
    for slot in slots {
        if count == 0 {
            break;
        }
        let Some(stack) = inventory.get_mut(&slot) else {
            continue;
        };
        let taken = stack.count.min(count);
        stack.count = stack.count.saturating_sub(taken);
        count = count.saturating_sub(taken);
        if stack.count == 0 {
            inventory.remove(&slot);
        }
    }
}

/// Opens sessions onto a [`LoopbackWorld`].
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    world: Arc<LoopbackWorld>,
}

impl LoopbackConnector {
    /// A connector for `world`.
    pub const fn new(world: Arc<LoopbackWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Session, ConnectionError> {
        self.world.connect_session(options)
    }
}

/// One session's handle onto the world. Stale handles (from a replaced
/// session) reject commands.
struct LoopbackConnection {
    world: Arc<LoopbackWorld>,
    generation: u64,
}

impl LoopbackConnection {
    fn live(&self) -> Result<MutexGuard<'_, WorldState>, ConnectionError> {
        let state = self.world.state();
        if state.generation == self.generation && state.events.is_some() {
            Ok(state)
        } else {
            Err(ConnectionError::Closed)
        }
    }

    fn read<T>(&self, f: impl FnOnce(&WorldState) -> Option<T>) -> Option<T> {
        let mut state = self.live().ok()?;
        self.world.settle_meal(&mut state);
        f(&state)
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn position(&self) -> Option<Coordinate> {
        self.read(|s| s.position)
    }

    fn health(&self) -> Option<f32> {
        self.read(|s| s.health)
    }

    fn food(&self) -> Option<u32> {
        self.read(|s| s.food)
    }

    fn dimension(&self) -> Option<Dimension> {
        self.read(|s| s.dimension.clone())
    }

    fn inventory(&self) -> Option<Inventory> {
        self.read(|s| {
            s.inventory_readable
                .then(|| Inventory::from_stacks(s.inventory.values().cloned()))
        })
    }

    fn hand_slot(&self, hand: Hand) -> Option<u16> {
        Some(hand_slot(hand))
    }

    fn entities(&self) -> Vec<RawEntity> {
        self.read(|s| {
            let mut entities = s.entities.clone();
            if let Some(position) = s.position {
                entities.push(RawEntity {
                    id: EntityId(0),
                    kind: EntityKind::Player,
                    position,
                    username: Some(s.username.clone()),
                    item_id: None,
                    profession: None,
                });
            }
            Some(entities)
        })
        .unwrap_or_default()
    }

    fn set_goal(&self, target: Coordinate, range: f64) -> Result<(), ConnectionError> {
        let mut state = self.live()?;
        state.commands.push(Command::SetGoal { target, range });
        if state.goal_failures > 0 {
            state.goal_failures = state.goal_failures.saturating_sub(1);
            return Err(ConnectionError::Goal {
                reason: "no path to goal".to_owned(),
            });
        }
        state.goal = Some((target, range));
        Ok(())
    }

    fn stop_pathing(&self) {
        if let Ok(mut state) = self.live() {
            state.commands.push(Command::StopPathing);
            state.goal = None;
        }
    }

    fn equip(&self, slot: u16, hand: Hand) -> Result<(), ConnectionError> {
        let mut state = self.live()?;
        self.world.settle_meal(&mut state);
        state.commands.push(Command::Equip { slot, hand });
        let target = hand_slot(hand);
        let Some(mut stack) = state.inventory.remove(&slot) else {
            return Err(ConnectionError::EmptySlot { slot });
        };
        if slot == target {
            state.inventory.insert(slot, stack);
            return Ok(());
        }
        if let Some(mut displaced) = state.inventory.remove(&target) {
            displaced.slot = slot;
            state.inventory.insert(slot, displaced);
        }
        stack.slot = target;
        state.inventory.insert(target, stack);
        Ok(())
    }

    fn activate_item(&self, hand: Hand) -> Result<(), ConnectionError> {
        let mut state = self.live()?;
        self.world.settle_meal(&mut state);
        state.commands.push(Command::ActivateItem(hand));
        state.using = Some(hand);
        let edible = state
            .inventory
            .get(&hand_slot(hand))
            .is_some_and(|s| self.world.data.food(s.type_id).is_some());
        if hand == Hand::Main && edible && state.food.is_some_and(|f| f < 20) {
            state.eating_until = Instant::now().checked_add(EAT_DURATION);
        }
        Ok(())
    }

    fn deactivate_item(&self) {
        if let Ok(mut state) = self.live() {
            state.commands.push(Command::DeactivateItem);
            state.using = None;
            state.eating_until = None;
        }
    }

    fn is_using_held_item(&self) -> bool {
        self.read(|s| Some(s.using.is_some())).unwrap_or(false)
    }

    async fn open_villager(&self, id: EntityId) -> Result<Vec<TradeOffer>, ConnectionError> {
        let mut state = self.live()?;
        state.commands.push(Command::OpenVillager(id));
        let loaded = state.entities.iter().any(|e| e.id == id);
        let Some(offers) = state.offers.get(&id).filter(|_| loaded).cloned() else {
            return Err(ConnectionError::EntityNotFound { id });
        };
        state.window = Some(id);
        Ok(offers)
    }

    async fn trade(&self, index: usize, times: u32) -> Result<(), ConnectionError> {
        let mut state = self.live()?;
        state.commands.push(Command::Trade { index, times });
        if state.trade_failures {
            return Err(ConnectionError::Trade {
                reason: "villager refused".to_owned(),
            });
        }
        let window = state.window.ok_or(ConnectionError::NoWindow)?;
        for _ in 0..times {
            let offer = state
                .offers
                .get(&window)
                .and_then(|offers| offers.get(index))
                .cloned()
                .ok_or_else(|| ConnectionError::Trade {
                    reason: format!("no offer at index {index}"),
                })?;
            if offer.is_exhausted() {
                return Err(ConnectionError::Trade {
                    reason: "offer is disabled".to_owned(),
                });
            }
            let held = state
                .inventory
                .values()
                .filter(|s| s.name == offer.input.name)
                .fold(0_u32, |acc, s| acc.saturating_add(s.count));
            if held < offer.input.count {
                return Err(ConnectionError::Trade {
                    reason: format!("not enough {}", offer.input.name),
                });
            }
            remove_items(&mut state.inventory, &offer.input.name, offer.input.count);
            if let Some(output_id) = self.world.data.item_id(&offer.output.name) {
                add_items(
                    &mut state.inventory,
                    output_id,
                    &offer.output.name,
                    offer.output.count,
                );
            }
            if let Some(listed) = state
                .offers
                .get_mut(&window)
                .and_then(|offers| offers.get_mut(index))
            {
                listed.uses = listed.uses.saturating_add(1);
                listed.disabled = listed.is_exhausted();
            }
        }
        Ok(())
    }

    fn trade_offers(&self) -> Option<Vec<TradeOffer>> {
        self.read(|s| s.window.and_then(|id| s.offers.get(&id).cloned()))
    }

    fn close_window(&self) -> Result<(), ConnectionError> {
        let mut state = self.live()?;
        state.commands.push(Command::CloseWindow);
        state.window.take().map(|_| ()).ok_or(ConnectionError::NoWindow)
    }

    fn end(&self, reason: &str) {
        if let Ok(mut state) = self.live() {
            debug!(reason, "Loopback session ended");
            state.commands.push(Command::End);
            state.events = None;
            state.goal = None;
            state.window = None;
        }
    }
}
