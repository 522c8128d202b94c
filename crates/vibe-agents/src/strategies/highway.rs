//! Control-loop strategy for long flat highway trips.
//!
//! Owns navigation, the safety monitor, eating, loot reporting and
//! optionally the shield, and starts and stops them together. The target
//! must lie at the highway's fixed height.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use vibe_core::action::{Action, Attachable};
use vibe_core::agent::Agent;
use vibe_core::config::BotConfig;
use vibe_core::strategy::{RunState, Strategy, StrategyError};
use vibe_types::Coordinate;

use crate::actions::{AlwaysShield, EfficientEat, GotoLocation, LootFinder, SafetyMonitor};

/// Blocks between navigation progress lines on a highway.
pub const HIGHWAY_LOG_INTERVAL: f64 = 10_000.0;

/// Player-triggered reconnect wait.
const RECONNECT_WAIT: Duration = Duration::from_secs(60);

/// Player-triggered reconnect wait in debug mode.
const DEBUG_RECONNECT_WAIT: Duration = Duration::from_secs(5);

/// Travel a highway to a fixed target.
pub struct HighwayStrategy {
    target: Coordinate,
    actions: Vec<Box<dyn Attachable>>,
    run: RunState,
}

impl core::fmt::Debug for HighwayStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HighwayStrategy")
            .field("target", &self.target)
            .field(
                "actions",
                &self.actions.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("running", &self.run.is_running())
            .finish()
    }
}

impl HighwayStrategy {
    /// Build the strategy for `config.strategy.target`.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::InvalidParameters`] if the target's y is not
    /// the configured highway height.
    pub fn new(agent: &Arc<Agent>, config: &BotConfig) -> Result<Self, StrategyError> {
        let target = config.strategy.target;
        let required_y = config.strategy.required_y;
        if (target.y - required_y).abs() > f64::EPSILON {
            return Err(StrategyError::InvalidParameters {
                reason: format!("highway target y must be {required_y}, got {}", target.y),
            });
        }
        let reconnect_wait = if config.strategy.debug {
            DEBUG_RECONNECT_WAIT
        } else {
            RECONNECT_WAIT
        };

        let dispatcher = agent.dispatcher();
        let mut actions: Vec<Box<dyn Attachable>> = vec![
            Box::new(Action::new(
                Arc::clone(dispatcher),
                GotoLocation::new(Arc::clone(agent), target, &config.navigation)
                    .with_log_interval(HIGHWAY_LOG_INTERVAL),
            )),
            Box::new(Action::new(
                Arc::clone(dispatcher),
                SafetyMonitor::new(Arc::clone(agent), &config.safety, &config.eating)
                    .with_reconnect_wait(Some(reconnect_wait)),
            )),
            Box::new(Action::new(
                Arc::clone(dispatcher),
                EfficientEat::new(Arc::clone(agent), &config.eating),
            )),
        ];
        if config.loot.enabled {
            actions.push(Box::new(Action::new(
                Arc::clone(dispatcher),
                LootFinder::new(Arc::clone(agent), &config.loot),
            )));
        }
        if config.shield.enabled {
            actions.push(Box::new(Action::new(
                Arc::clone(dispatcher),
                AlwaysShield::new(Arc::clone(agent), &config.shield),
            )));
        }

        Ok(Self {
            target,
            actions,
            run: RunState::new(),
        })
    }

    /// Names of the owned behaviors, in start order.
    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Whether every owned behavior is attached.
    pub fn all_attached(&self) -> bool {
        self.actions.iter().all(|a| a.is_attached())
    }
}

#[async_trait]
impl Strategy for HighwayStrategy {
    fn name(&self) -> &'static str {
        "Highway"
    }

    fn start(self: Arc<Self>) -> Result<(), StrategyError> {
        self.run.begin(self.name())?;
        for action in &self.actions {
            action.start();
        }
        info!(
            run = %self.run.id(),
            target = %self.target,
            actions = self.actions.len(),
            "Highway strategy started"
        );
        Ok(())
    }

    fn stop(&self) {
        if !self.run.finish() {
            return;
        }
        for action in self.actions.iter().rev() {
            action.stop();
        }
        info!("Highway strategy stopped");
    }

    fn is_running(&self) -> bool {
        self.run.is_running()
    }

    async fn finished(&self) {
        self.run.finished().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vibe_core::loopback::{LoopbackConnector, LoopbackWorld};
    use vibe_types::EventKind;

    use super::*;

    fn agent() -> Arc<Agent> {
        let world = LoopbackWorld::new(Coordinate::new(0.0, 120.0, 0.0));
        Agent::new(
            &BotConfig::default(),
            Arc::new(LoopbackConnector::new(Arc::clone(&world))),
            Arc::new(world.game_data().clone()),
        )
    }

    #[test]
    fn rejects_off_highway_targets() {
        let mut config = BotConfig::default();
        config.strategy.target = Coordinate::new(1000.0, 64.0, 1000.0);
        assert!(matches!(
            HighwayStrategy::new(&agent(), &config),
            Err(StrategyError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn owns_the_configured_behaviors() {
        let mut config = BotConfig::default();
        config.shield.enabled = true;
        let strategy = HighwayStrategy::new(&agent(), &config).unwrap();
        assert_eq!(
            strategy.action_names(),
            vec![
                "Goto Location",
                "Safety Monitor",
                "Efficient Eat",
                "Loot Finder",
                "Always Shield"
            ]
        );
    }

    #[test]
    fn start_and_stop_attach_and_detach_everything() {
        let agent = agent();
        let strategy = Arc::new(HighwayStrategy::new(&agent, &BotConfig::default()).unwrap());
        let baseline = agent.dispatcher().handler_count(EventKind::Tick);

        Arc::clone(&strategy).start().unwrap();
        assert!(strategy.is_running());
        assert!(strategy.all_attached());
        assert_eq!(agent.dispatcher().handler_count(EventKind::Tick), baseline + 4);

        strategy.stop();
        strategy.stop();
        assert!(!strategy.is_running());
        assert_eq!(agent.dispatcher().handler_count(EventKind::Tick), baseline);
    }

    #[test]
    fn cannot_restart_after_stop() {
        let strategy = Arc::new(HighwayStrategy::new(&agent(), &BotConfig::default()).unwrap());
        Arc::clone(&strategy).start().unwrap();
        strategy.stop();
        assert!(matches!(
            Arc::clone(&strategy).start(),
            Err(StrategyError::AlreadyStarted { .. })
        ));
    }
}
