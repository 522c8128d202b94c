//! Engine binary for the Vibe bot.
//!
//! Wires configuration, logging, the agent and the configured strategy
//! together and runs until the agent shuts down, the strategy finishes, or
//! Ctrl-C is pressed. The environment is the in-memory loopback world, so a
//! run is a dry run of the orchestration against a straight-line mover.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$VIBE_CONFIG` or `vibe-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the loopback world and start its tick source
//! 4. Connect the agent and wait for tick delivery
//! 5. Build and start the configured strategy
//! 6. Wait for shutdown, strategy completion, or Ctrl-C
//! 7. Stop the strategy, disconnect, and log the result

mod error;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vibe_core::config::BotConfig;
use vibe_core::loopback::{LoopbackConnector, LoopbackWorld};
use vibe_types::Coordinate;

use crate::error::EngineError;

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "vibe-config.yaml";

/// Physics tick period of the loopback world (20 ticks per second).
const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Food stocked in the dry-run inventory.
const DRY_RUN_FOOD: (&str, u32) = ("cooked_beef", 32);

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, connection, or strategy startup fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let path = config_path();
    let (config, from_file) = load_config(&path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("vibe-engine starting");
    if from_file {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
    }
    info!(
        host = %config.connection.host,
        port = config.connection.port,
        username = %config.connection.username,
        strategy = %config.strategy.kind,
        target = %config.strategy.target,
        "Run parameters"
    );

    // 3. Create the loopback world.
    let world = LoopbackWorld::new(Coordinate::new(0.0, config.strategy.required_y, 0.0));
    world.set_spawns_on_join(config.connection.required_spawns());
    let (food, count) = DRY_RUN_FOOD;
    world.give(food, count);
    let ticker = world.spawn_ticker(TICK_PERIOD);
    info!(tick_period_ms = 50, "Loopback world started");

    // 4-7. Run the session.
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    let result = session::run(
        &config,
        Arc::new(LoopbackConnector::new(Arc::clone(&world))),
        Arc::new(world.game_data().clone()),
        interrupt,
    )
    .await;
    ticker.abort();

    let reason = result?;
    info!(
        ?reason,
        connects = world.connect_count(),
        "vibe-engine shutdown complete"
    );
    Ok(())
}

/// Config path from `VIBE_CONFIG`, else the default.
fn config_path() -> PathBuf {
    std::env::var_os("VIBE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration at `path`, falling back to defaults if the file
/// does not exist. Returns whether the file was read.
fn load_config(path: &Path) -> Result<(BotConfig, bool), EngineError> {
    if path.exists() {
        Ok((BotConfig::from_file(path)?, true))
    } else {
        let mut config = BotConfig::default();
        config.connection.apply_env_overrides();
        config.validate()?;
        Ok((config, false))
    }
}
