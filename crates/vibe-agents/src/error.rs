//! Error types for the vibe-agents crate.
//!
//! Behaviors report failures through the dispatcher's `HandlerError`;
//! the trade cycle runs outside the dispatcher and uses [`TradeError`] for
//! the failures it logs and recovers from.

use vibe_core::agent::AgentError;
use vibe_types::{Coordinate, EntityId};

/// Failures inside one trade-cycle step. None of them are fatal: the cycle
/// logs them and moves on to the next villager or backs off.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    /// An agent command failed.
    #[error("agent command failed: {source}")]
    Agent {
        /// The underlying facade error.
        #[from]
        source: AgentError,
    },

    /// The inventory could not be read.
    #[error("inventory is unavailable")]
    InventoryUnavailable,

    /// The villager was not reached in time.
    #[error("did not reach {target} within {timeout_secs}s")]
    PathfindTimeout {
        /// Where the agent was heading.
        target: Coordinate,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The villager is no longer loaded.
    #[error("villager {id} is gone")]
    VillagerLost {
        /// The villager's last known id.
        id: EntityId,
    },

    /// The villager has no offer producing the wanted item.
    #[error("villager {id} has no offer for {item}")]
    NoOffer {
        /// The villager.
        id: EntityId,
        /// The wanted output item.
        item: String,
    },

    /// The strategy was stopped mid-step.
    #[error("trade cycle stopped")]
    Stopped,
}
