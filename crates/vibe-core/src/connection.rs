//! The external connection collaborator.
//!
//! A [`Connector`] opens a [`Session`] to the environment: a live
//! [`Connection`] handle for reading agent state and issuing commands, plus a
//! channel of [`EnvironmentEvent`]s. The protocol client and the movement
//! engine behind it are out of scope for this workspace; the only in-tree
//! implementation is [`crate::loopback`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vibe_types::{
    Coordinate, Dimension, EntityId, EnvironmentEvent, Hand, Inventory, ItemStack, RawEntity,
    TradeOffer,
};

/// Errors reported by the connection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The connection could not be established.
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// What went wrong.
        reason: String,
    },

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// The movement engine rejected a goal.
    #[error("failed to set movement goal: {reason}")]
    Goal {
        /// What went wrong.
        reason: String,
    },

    /// An inventory slot was empty or invalid.
    #[error("inventory slot {slot} is empty")]
    EmptySlot {
        /// The slot index.
        slot: u16,
    },

    /// The target entity is not loaded.
    #[error("entity {id} not found")]
    EntityNotFound {
        /// The entity id.
        id: EntityId,
    },

    /// No window is open.
    #[error("no window is open")]
    NoWindow,

    /// A trade could not be executed.
    #[error("trade failed: {reason}")]
    Trade {
        /// What went wrong.
        reason: String,
    },
}

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Account name.
    pub username: String,
    /// Protocol version, when pinned.
    pub version: Option<String>,
    /// Skip online authentication.
    pub no_auth: bool,
}

/// An open session: the live handle plus the environment's event stream.
pub struct Session {
    /// Live connection handle.
    pub connection: Arc<dyn Connection>,
    /// Events emitted by the environment, in order.
    pub events: mpsc::UnboundedReceiver<EnvironmentEvent>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Opens sessions to the environment.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session.
    async fn connect(&self, options: &ConnectOptions) -> Result<Session, ConnectionError>;
}

/// A live handle to the agent inside the environment.
///
/// State accessors return `None` when the value has not been received yet.
/// Commands are fire-and-forget except where they await a reply.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Current position of the agent.
    fn position(&self) -> Option<Coordinate>;

    /// Current health (0-20).
    fn health(&self) -> Option<f32>;

    /// Current food level (0-20).
    fn food(&self) -> Option<u32>;

    /// Current dimension.
    fn dimension(&self) -> Option<Dimension>;

    /// Snapshot of the occupied inventory slots.
    fn inventory(&self) -> Option<Inventory>;

    /// Inventory slot that items equipped to `hand` land in.
    fn hand_slot(&self, hand: Hand) -> Option<u16>;

    /// All loaded entities (may include the agent itself).
    fn entities(&self) -> Vec<RawEntity>;

    /// Set a movement goal: reach within `range` of `target`.
    fn set_goal(&self, target: Coordinate, range: f64) -> Result<(), ConnectionError>;

    /// Halt the movement engine and clear its goal.
    fn stop_pathing(&self);

    /// Move the stack in `slot` to `hand`.
    fn equip(&self, slot: u16, hand: Hand) -> Result<(), ConnectionError>;

    /// Begin using the item held in `hand` (eat, raise shield).
    fn activate_item(&self, hand: Hand) -> Result<(), ConnectionError>;

    /// Stop using the held item.
    fn deactivate_item(&self);

    /// Whether the held item is currently in use.
    fn is_using_held_item(&self) -> bool;

    /// Open the trade window of villager `id`, returning its offers.
    async fn open_villager(&self, id: EntityId) -> Result<Vec<TradeOffer>, ConnectionError>;

    /// Execute offer `index` of the open trade window `times` times.
    async fn trade(&self, index: usize, times: u32) -> Result<(), ConnectionError>;

    /// Offers listed by the open trade window, refreshed after each trade.
    fn trade_offers(&self) -> Option<Vec<TradeOffer>>;

    /// Close the open window.
    fn close_window(&self) -> Result<(), ConnectionError>;

    /// Close the connection.
    fn end(&self, reason: &str);

    /// The stack equipped to `hand`, if any.
    fn held_item(&self, hand: Hand) -> Option<ItemStack> {
        let slot = self.hand_slot(hand)?;
        self.inventory()?.get(slot).cloned()
    }
}
