//! Shared value types for the vibe agent orchestration engine.
//!
//! This crate is the single source of truth for the data that flows between
//! the agent facade, the event dispatcher, behaviors, and strategies. It has
//! no knowledge of connections or scheduling.
//!
//! # Modules
//!
//! - [`ids`] -- Typed identifiers (sessions, strategy runs, environment entities)
//! - [`enums`] -- Event kinds, entity kinds, hands, and dimensions
//! - [`events`] -- Environment events, dispatched events, and the bounded tick slot
//! - [`structs`] -- Coordinates, inventory, entity summaries, and trade offers

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Dimension, EntityKind, EventKind, Hand};
pub use events::{
    EnvironmentEvent, Event, PhysicsTick, TICKS_PER_WINDOW, TickEvent, TickSlot, TickSlotError,
};
pub use ids::{EntityId, RunId, SessionId};
pub use structs::{
    Coordinate, EntitySummary, Inventory, ItemStack, OfferItem, RawEntity, TradeOffer,
    VillagerInfo,
};
