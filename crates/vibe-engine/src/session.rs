//! One agent session: connect, start the configured strategy, and wait for
//! whatever ends the run.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};
use vibe_agents::build_strategy;
use vibe_core::agent::{Agent, ShutdownReason};
use vibe_core::config::BotConfig;
use vibe_core::connection::Connector;
use vibe_core::registry::GameData;

use crate::error::EngineError;

/// Connect, wait for tick delivery, and run the strategy selected by
/// `config.strategy.kind` until the agent shuts down, the strategy finishes,
/// or `interrupt` resolves.
///
/// The strategy is always stopped and the agent disconnected before this
/// returns. The result is the first shutdown reason recorded.
///
/// # Errors
///
/// Returns [`EngineError::Agent`] if the first connect fails,
/// [`EngineError::NotActive`] if ticks never activate, or
/// [`EngineError::Strategy`] if the strategy rejects the configuration.
pub async fn run(
    config: &BotConfig,
    connector: Arc<dyn Connector>,
    game_data: Arc<dyn GameData>,
    interrupt: impl Future<Output = ()> + Send,
) -> Result<ShutdownReason, EngineError> {
    let agent = Agent::new(config, connector, game_data);
    agent.connect().await?;

    let active_wait = config.connection.active_wait();
    if !agent.wait_for_active_ticks(active_wait).await {
        return Err(EngineError::NotActive {
            wait_secs: active_wait.as_secs(),
        });
    }

    let strategy = match build_strategy(config.strategy.kind, &agent, config) {
        Ok(strategy) => strategy,
        Err(err) => {
            agent.shutdown(ShutdownReason::Requested);
            return Err(err.into());
        }
    };
    if let Err(err) = Arc::clone(&strategy).start() {
        agent.shutdown(ShutdownReason::Requested);
        return Err(err.into());
    }
    info!(strategy = strategy.name(), kind = %config.strategy.kind, "Strategy running");

    tokio::select! {
        reason = agent.wait_for_shutdown() => {
            info!(?reason, "Agent shut down");
        }
        () = strategy.finished() => {
            info!(strategy = strategy.name(), "Strategy finished");
            agent.shutdown(ShutdownReason::StrategyFinished);
        }
        () = interrupt => {
            warn!("Interrupted, shutting down");
            agent.shutdown(ShutdownReason::Requested);
        }
    }

    strategy.stop();
    agent.disconnect();
    Ok(agent.wait_for_shutdown().await)
}
