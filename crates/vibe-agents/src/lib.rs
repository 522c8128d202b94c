//! Concrete behaviors and strategies for the vibe agent.
//!
//! This crate holds everything that decides what the agent does. It sits on
//! top of `vibe-core` (dispatcher, action lifecycle, agent facade) and is
//! driven by `vibe-engine`.
//!
//! # Modules
//!
//! - [`actions`] -- Dispatcher-driven behaviors: navigation, safety, eating, loot, shield.
//! - [`strategies`] -- Highway control loop and villager trade cycle.
//! - [`error`] -- Trade-cycle errors ([`TradeError`]).

pub mod actions;
pub mod error;
pub mod strategies;

use std::sync::Arc;

use vibe_core::agent::Agent;
use vibe_core::config::{BotConfig, StrategyKind};
use vibe_core::strategy::{Strategy, StrategyError};

pub use error::TradeError;
pub use strategies::{HighwayStrategy, TradeSummary, VillagerTradeStrategy};

/// Build the strategy named by `kind`. The caller starts it.
///
/// # Errors
///
/// Returns [`StrategyError::InvalidParameters`] if the strategy rejects
/// `config`.
pub fn build_strategy(
    kind: StrategyKind,
    agent: &Arc<Agent>,
    config: &BotConfig,
) -> Result<Arc<dyn Strategy>, StrategyError> {
    Ok(match kind {
        StrategyKind::Highway => Arc::new(HighwayStrategy::new(agent, config)?),
        StrategyKind::VillagerTrade => {
            Arc::new(VillagerTradeStrategy::new(Arc::clone(agent), &config.trade))
        }
    })
}
