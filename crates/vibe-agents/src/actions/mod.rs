//! Dispatcher-driven behaviors.
//!
//! Each type here implements [`vibe_core::action::Behavior`] and is attached
//! through a [`vibe_core::action::Action`]. Behaviors run synchronously
//! inside a tick's dispatch; anything that must wait (eating) hands the work
//! to a spawned task and returns.
//!
//! # Submodules
//!
//! - [`goto`] -- Goal-seeking navigation with progress and ETA logging.
//! - [`safety`] -- Health, player, food, and stuck checks with disconnect or reconnect.
//! - [`eat`] -- Food selection and the meal loop.
//! - [`loot`] -- Valuable dropped-item reporting.
//! - [`shield`] -- Off-hand shield keeper.

pub mod eat;
pub mod goto;
pub mod loot;
pub mod safety;
pub mod shield;

pub use eat::{EfficientEat, best_food};
pub use goto::{GotoLocation, NavState, SPRINT_AND_EAT_SPEED, format_eta, walk_time};
pub use loot::LootFinder;
pub use safety::{SafetyMonitor, SafetyVerdict};
pub use shield::AlwaysShield;
