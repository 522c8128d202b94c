//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup, so `main` can
//! propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: vibe_core::config::ConfigError,
    },

    /// The agent could not connect.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: vibe_core::agent::AgentError,
    },

    /// The strategy could not be built or started.
    #[error("strategy error: {source}")]
    Strategy {
        /// The underlying strategy error.
        #[from]
        source: vibe_core::strategy::StrategyError,
    },

    /// Tick delivery never became active after connecting.
    #[error("agent did not become active within {wait_secs}s")]
    NotActive {
        /// How long startup waited.
        wait_secs: u64,
    },
}
