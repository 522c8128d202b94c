//! Goal-seeking navigation to a fixed target.
//!
//! States: [`NavState::Idle`] until the first gated tick issues the movement
//! goal, [`NavState::Seeking`] while the movement engine works, and
//! [`NavState::Arrived`] once the agent is within tolerance of the target on
//! every axis. Arrived is terminal until [`Behavior::on_stop`] resets the
//! machine.
//!
//! Progress is logged every `log_interval` blocks travelled, with an ETA
//! computed from the speed measured since the previous log line.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info};
use vibe_core::action::Behavior;
use vibe_core::agent::{Agent, ShutdownReason};
use vibe_core::config::NavigationConfig;
use vibe_core::dispatcher::{HandlerResult, Outcome};
use vibe_types::{Coordinate, Event, TickSlot};

/// Blocks per second while sprinting with regular eating stops.
pub const SPRINT_AND_EAT_SPEED: f64 = 3.82;

/// Seconds added to every estimate for goal setup.
const ETA_OVERHEAD_SECS: f64 = 0.1;

/// Navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// No goal issued yet, or the last attempt could not be issued.
    Idle,
    /// Goal issued; waiting to arrive.
    Seeking,
    /// Within tolerance of the target.
    Arrived,
}

/// Format a duration in seconds as `HH:MM:SS`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_eta(seconds: f64) -> String {
    if !seconds.is_finite() {
        return String::from("--:--:--");
    }
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Estimated time to cover `distance` blocks at `speed` blocks per second.
pub fn walk_time(distance: f64, speed: f64) -> String {
    format_eta(distance / speed + ETA_OVERHEAD_SECS)
}

/// Drives the agent to a target coordinate.
#[derive(Debug)]
pub struct GotoLocation {
    agent: Arc<Agent>,
    target: Coordinate,
    offset: TickSlot,
    log_interval: f64,
    tolerance: f64,
    exit_on_arrival: bool,
    state: NavState,
    checkpoint: Option<(Coordinate, Instant)>,
}

impl GotoLocation {
    /// Navigate to `target` with the given settings.
    pub const fn new(agent: Arc<Agent>, target: Coordinate, config: &NavigationConfig) -> Self {
        Self {
            agent,
            target,
            offset: config.tick_offset,
            log_interval: config.log_interval_blocks,
            tolerance: config.arrival_tolerance,
            exit_on_arrival: config.exit_on_arrival,
            state: NavState::Idle,
            checkpoint: None,
        }
    }

    /// Override the progress log interval, in blocks.
    #[must_use]
    pub const fn with_log_interval(mut self, blocks: f64) -> Self {
        self.log_interval = blocks;
        self
    }

    /// Current state.
    pub const fn state(&self) -> NavState {
        self.state
    }

    /// The target coordinate.
    pub const fn target(&self) -> Coordinate {
        self.target
    }

    fn begin(&mut self) -> HandlerResult {
        if let Some(position) = self.agent.position() {
            let distance = position.distance(&self.target);
            info!(
                target = %self.target,
                distance = distance.round(),
                eta = %walk_time(distance, SPRINT_AND_EAT_SPEED),
                "Starting navigation"
            );
        }
        self.agent.goto(self.target)?;
        self.state = NavState::Seeking;
        self.checkpoint = None;
        Ok(Outcome::Acted)
    }

    fn seek(&mut self) -> HandlerResult {
        let Some(position) = self.agent.position() else {
            debug!("Position unavailable, waiting");
            return Ok(Outcome::Idle);
        };

        if position.within(&self.target, self.tolerance) {
            self.agent.stop_pathing();
            self.agent.clear_goal();
            self.state = NavState::Arrived;
            info!(target = %self.target, position = %position, "Arrived at destination");
            if self.exit_on_arrival {
                self.agent.shutdown(ShutdownReason::Arrived);
            }
            return Ok(Outcome::Acted);
        }

        let now = Instant::now();
        let Some((from, since)) = self.checkpoint else {
            self.checkpoint = Some((position, now));
            return Ok(Outcome::Idle);
        };
        let travelled = position.distance(&from);
        if travelled < self.log_interval {
            return Ok(Outcome::Idle);
        }

        let elapsed = now.saturating_duration_since(since).as_secs_f64();
        let remaining = position.distance(&self.target);
        let eta = if elapsed > 0.0 {
            walk_time(remaining, travelled / elapsed)
        } else {
            walk_time(remaining, SPRINT_AND_EAT_SPEED)
        };
        info!(
            position = %position,
            remaining = remaining.round(),
            speed = travelled / elapsed.max(f64::EPSILON),
            %eta,
            "Navigation progress"
        );
        self.checkpoint = Some((position, now));
        Ok(Outcome::Acted)
    }
}

impl Behavior for GotoLocation {
    fn name(&self) -> &'static str {
        "Goto Location"
    }

    fn description(&self) -> &'static str {
        "Travels to a target coordinate and reports progress."
    }

    fn tick_offset(&self) -> Option<TickSlot> {
        Some(self.offset)
    }

    fn run_once(&mut self, _event: &Event) -> HandlerResult {
        match self.state {
            NavState::Idle => self.begin(),
            NavState::Seeking => self.seek(),
            NavState::Arrived => Ok(Outcome::Idle),
        }
    }

    fn on_stop(&mut self) {
        self.agent.stop_pathing();
        self.agent.clear_goal();
        self.state = NavState::Idle;
        self.checkpoint = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use vibe_core::config::BotConfig;
    use vibe_core::loopback::{Command, LoopbackConnector, LoopbackWorld};

    use super::*;

    const TARGET: Coordinate = Coordinate::new(1000.0, 120.0, 1000.0);

    async fn connected(position: Coordinate) -> (Arc<LoopbackWorld>, Arc<Agent>) {
        let world = LoopbackWorld::new(position);
        let agent = Agent::new(
            &BotConfig::default(),
            Arc::new(LoopbackConnector::new(Arc::clone(&world))),
            Arc::new(world.game_data().clone()),
        );
        agent.connect().await.unwrap();
        (world, agent)
    }

    fn tick() -> Event {
        Event::tick(TickSlot::new(19).unwrap(), 0)
    }

    #[test]
    fn eta_formats_as_clock_time() {
        assert_eq!(format_eta(3661.0), "01:01:01");
        assert_eq!(format_eta(59.6), "00:01:00");
        assert_eq!(format_eta(f64::INFINITY), "--:--:--");
        assert_eq!(walk_time(382.0, SPRINT_AND_EAT_SPEED), "00:01:40");
    }

    #[tokio::test]
    async fn first_tick_issues_goal_and_seeks() {
        let (world, agent) = connected(Coordinate::ORIGIN).await;
        let mut nav = GotoLocation::new(agent, TARGET, &NavigationConfig::default());

        assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Acted);
        assert_eq!(nav.state(), NavState::Seeking);
        assert_eq!(world.current_goal(), Some(TARGET));
    }

    #[tokio::test]
    async fn arrival_stops_and_issues_nothing_further() {
        let (world, agent) = connected(Coordinate::new(999.5, 120.2, 1000.7)).await;
        let config = NavigationConfig {
            exit_on_arrival: false,
            ..NavigationConfig::default()
        };
        let mut nav = GotoLocation::new(Arc::clone(&agent), TARGET, &config);
        nav.run_once(&tick()).unwrap();
        world.clear_commands();

        nav.run_once(&tick()).unwrap();
        assert_eq!(nav.state(), NavState::Arrived);
        assert_eq!(world.commands(), vec![Command::StopPathing]);

        world.clear_commands();
        for _ in 0..5 {
            assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Idle);
        }
        assert!(world.commands().is_empty());
        assert!(agent.goal().is_none());
        assert!(agent.is_connected());
    }

    #[tokio::test]
    async fn arrival_with_exit_shuts_the_agent_down() {
        let (_world, agent) = connected(TARGET).await;
        let mut nav = GotoLocation::new(Arc::clone(&agent), TARGET, &NavigationConfig::default());
        nav.run_once(&tick()).unwrap();
        nav.run_once(&tick()).unwrap();

        assert_eq!(agent.shutdown_reason(), Some(ShutdownReason::Arrived));
        assert!(!agent.is_connected());
    }

    #[tokio::test]
    async fn missing_position_keeps_seeking() {
        let (world, agent) = connected(Coordinate::ORIGIN).await;
        let mut nav = GotoLocation::new(agent, TARGET, &NavigationConfig::default());
        nav.run_once(&tick()).unwrap();
        world.set_position(None);

        assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Idle);
        assert_eq!(nav.state(), NavState::Seeking);
    }

    #[tokio::test]
    async fn disconnected_agent_stays_idle() {
        let (_world, agent) = connected(Coordinate::ORIGIN).await;
        agent.disconnect();
        let mut nav = GotoLocation::new(agent, TARGET, &NavigationConfig::default());

        assert!(nav.run_once(&tick()).is_err());
        assert_eq!(nav.state(), NavState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_logged_after_log_interval() {
        let (world, agent) = connected(Coordinate::ORIGIN).await;
        let mut nav = GotoLocation::new(agent, TARGET, &NavigationConfig::default())
            .with_log_interval(10.0);
        nav.run_once(&tick()).unwrap();
        assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Idle);

        tokio::time::advance(Duration::from_secs(2)).await;
        world.set_position(Some(Coordinate::new(5.0, 0.0, 0.0)));
        assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Idle);

        tokio::time::advance(Duration::from_secs(2)).await;
        world.set_position(Some(Coordinate::new(12.0, 0.0, 0.0)));
        assert_eq!(nav.run_once(&tick()).unwrap(), Outcome::Acted);
    }

    #[tokio::test]
    async fn stop_resets_from_any_state() {
        let (world, agent) = connected(Coordinate::ORIGIN).await;
        let mut nav = GotoLocation::new(Arc::clone(&agent), TARGET, &NavigationConfig::default());
        nav.on_stop();
        assert_eq!(nav.state(), NavState::Idle);

        nav.run_once(&tick()).unwrap();
        assert_eq!(agent.goal(), Some(TARGET));
        nav.on_stop();
        nav.on_stop();
        assert_eq!(nav.state(), NavState::Idle);
        assert!(world.current_goal().is_none());
        assert!(agent.goal().is_none());
    }
}
