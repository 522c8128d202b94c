//! Strategies: named compositions of behaviors with their own lifecycle.
//!
//! - [`highway`] -- Attaches navigation, safety, eating, loot and shield
//!   behaviors for a trip along a fixed-height highway.
//! - [`villager_trade`] -- A procedural search, trade and sleep loop.

pub mod highway;
pub mod villager_trade;

pub use highway::{HIGHWAY_LOG_INTERVAL, HighwayStrategy};
pub use villager_trade::{TradeSummary, VillagerTradeStrategy};
